use crate::eloquent::{ModelSchema, Resource};

/// An API application. Embedded in authentication failure log entries.
pub struct Application;

impl Resource for Application {
    const NAME: &'static str = "Application";

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, "/applications")
    }
}
