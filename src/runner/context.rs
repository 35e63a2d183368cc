use super::state::IterationRecord;
use crate::parser::types::{Environment, KeyValue};
use regex::Regex;
use std::sync::OnceLock;

/// Run-wide variable store.
///
/// Owns the live environment snapshot, the iteration counter and the log of
/// finished iterations. Passed explicitly to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Environment currently visible to request resolution
    pub environment: Environment,

    /// Number of the iteration in progress (1-based, 0 before the first)
    pub iteration: usize,

    /// Finished iterations, in order
    pub iterations: Vec<IterationRecord>,
}

impl RunContext {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            iteration: 0,
            iterations: Vec::new(),
        }
    }

    /// Copy of the current variables
    pub fn snapshot(&self) -> Vec<KeyValue> {
        self.environment.values.clone()
    }

    /// Replace the live variables, handing back the previous ones
    pub fn install(&mut self, values: Vec<KeyValue>) -> Vec<KeyValue> {
        std::mem::replace(&mut self.environment.values, values)
    }

    pub fn next_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn push_iteration(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }
}

/// Value of the last entry named `name`
pub fn find_var(vars: &[KeyValue], name: &str) -> Option<String> {
    vars.iter()
        .rev()
        .find(|kv| kv.key == name)
        .map(KeyValue::value_string)
}

/// Substitute `{{name}}` references; unknown names are left as written
pub fn substitute_vars(text: &str, vars: &[KeyValue]) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid pattern"));

    re.replace_all(text, |caps: &regex::Captures| {
        let key = caps[1].trim();
        find_var(vars, key).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_swaps_snapshot() {
        let mut ctx = RunContext::new(Environment {
            values: vec![KeyValue::new("a", "1")],
            ..Default::default()
        });

        let previous = ctx.install(vec![KeyValue::new("a", "2")]);

        assert_eq!(previous, vec![KeyValue::new("a", "1")]);
        assert_eq!(find_var(&ctx.snapshot(), "a").as_deref(), Some("2"));
    }

    #[test]
    fn test_iteration_counter() {
        let mut ctx = RunContext::default();
        assert_eq!(ctx.next_iteration(), 1);
        assert_eq!(ctx.next_iteration(), 2);
    }

    #[test]
    fn test_substitute_vars() {
        let vars = vec![KeyValue::new("host", "localhost"), KeyValue::new("port", 8080)];

        assert_eq!(
            substitute_vars("http://{{host}}:{{ port }}/{{missing}}", &vars),
            "http://localhost:8080/{{missing}}"
        );
    }
}
