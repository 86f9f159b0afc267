pub mod generator;
pub mod model;

pub use generator::{ScenarioBundle, ScenarioGenerator, scenario_id};
pub use model::{
    ExpectedResponse, ScenarioDocument, ScenarioMetadata, ScenarioStep, StepParameter, StepRequest,
};
