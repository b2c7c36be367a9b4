mod presets;
mod session_flow;
