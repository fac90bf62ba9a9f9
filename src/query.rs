use std::collections::BTreeMap;

use crate::error::SqlAdapterError;
use crate::interpolation::{InterpolationStrategy, Segment, Template, parse_template};
use crate::types::RowValues;

/// Argument values for a template: positional (`?`) or named (`:name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    Positional(Vec<RowValues>),
    Named(BTreeMap<String, RowValues>),
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Positional(Vec::new())
    }
}

impl From<Vec<RowValues>> for Parameters {
    fn from(values: Vec<RowValues>) -> Self {
        Parameters::Positional(values)
    }
}

impl Parameters {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    pub fn named<K, I>(values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RowValues)>,
    {
        Parameters::Named(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Parameters::Positional(values) => values.len(),
            Parameters::Named(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render `template` in the strategy's dialect and collect arguments in placeholder order.
    ///
    /// The strategy is reset before rendering, so the same instance yields the same text for the
    /// same template on every call.
    ///
    /// # Errors
    /// Returns `MalformedQuery` if the template is malformed or these parameters do not match its
    /// placeholders in count or kind.
    pub fn interpolate(
        &self,
        template: &str,
        strategy: &mut dyn InterpolationStrategy,
    ) -> Result<(String, Vec<RowValues>), SqlAdapterError> {
        let parsed = parse_template(template)?;
        let args = self.bind(&parsed)?;
        Ok((render(&parsed, strategy), args))
    }

    fn bind(&self, template: &Template<'_>) -> Result<Vec<RowValues>, SqlAdapterError> {
        let expected = template.placeholder_count();
        if expected == 0 {
            return if self.is_empty() {
                Ok(Vec::new())
            } else {
                Err(SqlAdapterError::MalformedQuery(format!(
                    "template has no placeholders but {} parameters were supplied",
                    self.len()
                )))
            };
        }

        match self {
            Parameters::Positional(values) => {
                if template.is_named() {
                    return Err(SqlAdapterError::MalformedQuery(
                        "template uses named placeholders but positional parameters were supplied"
                            .into(),
                    ));
                }
                if values.len() != expected {
                    return Err(SqlAdapterError::MalformedQuery(format!(
                        "template has {expected} placeholders but {} parameters were supplied",
                        values.len()
                    )));
                }
                Ok(values.clone())
            }
            Parameters::Named(values) => {
                if !template.is_named() {
                    return Err(SqlAdapterError::MalformedQuery(
                        "template uses positional placeholders but named parameters were supplied"
                            .into(),
                    ));
                }
                let mut args = Vec::with_capacity(expected);
                for name in template.names() {
                    let value = values.get(name).ok_or_else(|| {
                        SqlAdapterError::MalformedQuery(format!("missing named parameter `{name}`"))
                    })?;
                    args.push(value.clone());
                }
                if let Some(unused) = values
                    .keys()
                    .find(|key| !template.names().any(|name| name == key.as_str()))
                {
                    return Err(SqlAdapterError::MalformedQuery(format!(
                        "named parameter `{unused}` does not appear in the template"
                    )));
                }
                Ok(args)
            }
        }
    }
}

fn render(template: &Template<'_>, strategy: &mut dyn InterpolationStrategy) -> String {
    strategy.reset();
    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Positional | Segment::Named(_) => strategy.write_placeholder(&mut out),
        }
    }
    out
}

/// An engine-agnostic query: template text plus its parameters.
///
/// ```rust
/// use sql_engine_adapter::prelude::*;
///
/// let q = Query::named(
///     "select * from users where id = :id",
///     [("id", RowValues::Int(7))],
/// );
/// let (sql, args) = q.interpolate(&mut QuestionMarkStrategy).unwrap();
/// assert_eq!(sql, "select * from users where id = ?");
/// assert_eq!(args, vec![RowValues::Int(7)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    template: String,
    params: Parameters,
}

impl Query {
    pub fn new(template: impl Into<String>, params: Parameters) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }

    pub fn without_params(template: impl Into<String>) -> Self {
        Self::new(template, Parameters::none())
    }

    pub fn positional(template: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self::new(template, Parameters::Positional(params))
    }

    pub fn named<K, I>(template: impl Into<String>, params: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RowValues)>,
    {
        Self::new(template, Parameters::named(params))
    }

    /// The template exactly as supplied, before interpolation.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Dialect SQL and ordered arguments for this query's own parameters.
    ///
    /// # Errors
    /// See [`Parameters::interpolate`].
    pub fn interpolate(
        &self,
        strategy: &mut dyn InterpolationStrategy,
    ) -> Result<(String, Vec<RowValues>), SqlAdapterError> {
        self.params.interpolate(&self.template, strategy)
    }

    /// Dialect SQL used to prepare a statement; no arguments are produced.
    ///
    /// An empty parameter set means values arrive at execution time. A non-empty one must match
    /// the template exactly.
    ///
    /// # Errors
    /// Returns `MalformedQuery` if the template is malformed or a supplied parameter set does not
    /// fit it.
    pub fn interpolated_text(
        &self,
        strategy: &mut dyn InterpolationStrategy,
    ) -> Result<String, SqlAdapterError> {
        let parsed = parse_template(&self.template)?;
        if !self.params.is_empty() {
            self.params.bind(&parsed)?;
        }
        Ok(render(&parsed, strategy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::{DollarNumberedStrategy, QuestionMarkStrategy};

    #[test]
    fn positional_arguments_follow_placeholder_order() {
        let q = Query::positional(
            "insert into t (a, b) values (?, ?)",
            vec![RowValues::Int(1), RowValues::Text("x".into())],
        );
        let (sql, args) = q.interpolate(&mut DollarNumberedStrategy::default()).unwrap();
        assert_eq!(sql, "insert into t (a, b) values ($1, $2)");
        assert_eq!(args, vec![RowValues::Int(1), RowValues::Text("x".into())]);
    }

    #[test]
    fn named_arguments_repeat_per_occurrence() {
        let q = Query::named(
            "select * from t where a = :v or b = :v and c = :w",
            [("v", RowValues::Int(1)), ("w", RowValues::Int(2))],
        );
        let (sql, args) = q.interpolate(&mut DollarNumberedStrategy::default()).unwrap();
        assert_eq!(sql, "select * from t where a = $1 or b = $2 and c = $3");
        assert_eq!(
            args,
            vec![RowValues::Int(1), RowValues::Int(1), RowValues::Int(2)]
        );
    }

    #[test]
    fn count_mismatch_is_malformed() {
        let q = Query::positional("select ?, ?", vec![RowValues::Int(1)]);
        let err = q.interpolate(&mut QuestionMarkStrategy).unwrap_err();
        assert!(matches!(err, SqlAdapterError::MalformedQuery(_)));
    }

    #[test]
    fn missing_and_unused_names_are_malformed() {
        let missing = Query::named("select :a, :b", [("a", RowValues::Null)]);
        assert!(matches!(
            missing.interpolate(&mut QuestionMarkStrategy),
            Err(SqlAdapterError::MalformedQuery(_))
        ));
        let unused = Query::named(
            "select :a",
            [("a", RowValues::Null), ("zzz", RowValues::Null)],
        );
        assert!(matches!(
            unused.interpolate(&mut QuestionMarkStrategy),
            Err(SqlAdapterError::MalformedQuery(_))
        ));
    }

    #[test]
    fn kind_mismatch_is_malformed() {
        let q = Query::named("select ?", [("a", RowValues::Null)]);
        assert!(matches!(
            q.interpolate(&mut QuestionMarkStrategy),
            Err(SqlAdapterError::MalformedQuery(_))
        ));
    }

    #[test]
    fn same_instance_renders_stable_text() {
        let mut strategy = DollarNumberedStrategy::default();
        let template = "update t set a = ? where id = ?";
        let first = Parameters::from(vec![RowValues::Int(1), RowValues::Int(2)]);
        let second = Parameters::from(vec![RowValues::Int(3), RowValues::Int(4)]);
        let (sql1, args1) = first.interpolate(template, &mut strategy).unwrap();
        let (sql2, args2) = second.interpolate(template, &mut strategy).unwrap();
        assert_eq!(sql1, sql2);
        assert_ne!(args1, args2);
    }

    #[test]
    fn interpolated_text_accepts_deferred_parameters() {
        let q = Query::without_params("insert into t (a) values (?)");
        let sql = q.interpolated_text(&mut DollarNumberedStrategy::default()).unwrap();
        assert_eq!(sql, "insert into t (a) values ($1)");
    }

    #[test]
    fn interpolated_text_checks_supplied_parameters() {
        let q = Query::positional("insert into t (a, b) values (?, ?)", vec![RowValues::Int(5)]);
        assert!(matches!(
            q.interpolated_text(&mut QuestionMarkStrategy),
            Err(SqlAdapterError::MalformedQuery(_))
        ));
    }
}
