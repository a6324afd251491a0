mod chat_flow;
mod engine_wiring;
