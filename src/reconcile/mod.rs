pub mod orchestrator;
pub mod state_machine;
pub mod verifier;
