//! Variable substitution engine for template bodies.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Template, TemplateError, TemplateRenderer, TemplateRepository, TemplateVariable};

const LEFT_DELIM: &str = "[[";
const RIGHT_DELIM: &str = "]]";

/// Build the effective variable map for a render: exactly the declared
/// variables, each taking the supplied value when present and the declared
/// default otherwise. Supplied names the template does not declare are
/// ignored.
fn effective_variables(
    declared: &[TemplateVariable],
    supplied: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut result = HashMap::with_capacity(declared.len());
    for variable in declared {
        let value = supplied
            .get(&variable.name)
            .cloned()
            .unwrap_or_else(|| variable.default.clone());
        result.insert(variable.name.clone(), value);
    }
    result
}

/// Substitute `[[ .name ]]` placeholders in `body` against `variables`.
///
/// A name absent from the map renders as the empty string; malformed
/// placeholder syntax is a render error.
pub fn render_body(
    body: &str,
    variables: &HashMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find(LEFT_DELIM) {
        out.push_str(&rest[..start]);
        let after = &rest[start + LEFT_DELIM.len()..];

        let end = after.find(RIGHT_DELIM).ok_or_else(|| {
            TemplateError::Render(format!(
                "unclosed placeholder near byte {} of template body",
                body.len() - rest.len() + start
            ))
        })?;

        let expr = after[..end].trim();
        let name = expr.strip_prefix('.').ok_or_else(|| {
            TemplateError::Render(format!("malformed placeholder '{expr}': expected '.name'"))
        })?;

        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(TemplateError::Render(format!(
                "malformed placeholder '{expr}': invalid variable name"
            )));
        }

        if let Some(value) = variables.get(name) {
            out.push_str(value);
        }

        rest = &after[end + RIGHT_DELIM.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Repository-backed renderer used by the rule synchronizer.
#[derive(Clone)]
pub struct TemplateService {
    repository: TemplateRepository,
}

impl TemplateService {
    pub fn new(repository: TemplateRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl TemplateRenderer for TemplateService {
    async fn get_by_name(&self, name: &str) -> Result<Option<Template>, TemplateError> {
        self.repository.get_by_name(name).await
    }

    async fn render(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        let template = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or(TemplateError::NotFound)?;

        let effective = effective_variables(&template.variables, variables);
        render_body(&template.body, &effective)
    }
}
