mod state_events;
