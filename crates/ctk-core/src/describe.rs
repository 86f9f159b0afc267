use minijinja::Environment;
use serde::Serialize;

use crate::error::GeneratorError;

const NAME: &str = "description";

/// A user-supplied description template, compiled once per document and
/// rendered once per route or step. Output is trimmed.
pub struct Describer<'source> {
    env: Environment<'source>,
}

impl<'source> Describer<'source> {
    pub fn new(source: &'source str) -> Result<Self, GeneratorError> {
        let mut env = Environment::new();
        env.add_template(NAME, source).map_err(render_error)?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, GeneratorError> {
        let tmpl = self.env.get_template(NAME).map_err(render_error)?;
        let text = tmpl.render(ctx).map_err(render_error)?;
        Ok(text.trim().to_string())
    }
}

fn render_error(err: minijinja::Error) -> GeneratorError {
    GeneratorError::Render(err.to_string())
}
