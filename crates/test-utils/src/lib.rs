pub mod builders;

pub use builders::{ScenarioBuilder, ScriptedError, ScriptedOutcome, ScriptedTask};
