use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

mod scanner;

pub(crate) use scanner::{Segment, Template, parse_template};

/// Dialect-specific placeholder rendering.
///
/// An instance is created once per logical statement (see [`StrategyFactory`]) and reused for
/// every interpolation pass of that statement. Each pass starts with [`reset`](Self::reset), so
/// numbered dialects render the same text every time the same template is interpolated.
pub trait InterpolationStrategy: Send + Sync + fmt::Debug {
    /// Start a new interpolation pass.
    fn reset(&mut self);

    /// Append the marker for the next bound argument to `out`.
    fn write_placeholder(&mut self, out: &mut String);
}

/// `?` for every argument (`SQLite`, `MySQL`).
#[derive(Debug, Clone, Default)]
pub struct QuestionMarkStrategy;

impl InterpolationStrategy for QuestionMarkStrategy {
    fn reset(&mut self) {}

    fn write_placeholder(&mut self, out: &mut String) {
        out.push('?');
    }
}

/// `$1`, `$2`, ... (`PostgreSQL`).
#[derive(Debug, Clone, Default)]
pub struct DollarNumberedStrategy {
    next: usize,
}

impl InterpolationStrategy for DollarNumberedStrategy {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn write_placeholder(&mut self, out: &mut String) {
        self.next += 1;
        let _ = write!(out, "${}", self.next);
    }
}

/// `?1`, `?2`, ... (`SQLite` numbered parameters).
#[derive(Debug, Clone, Default)]
pub struct QuestionNumberedStrategy {
    next: usize,
}

impl InterpolationStrategy for QuestionNumberedStrategy {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn write_placeholder(&mut self, out: &mut String) {
        self.next += 1;
        let _ = write!(out, "?{}", self.next);
    }
}

/// Built-in placeholder styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$N`
    Postgres,
    /// `?N`
    Sqlite,
}

impl PlaceholderStyle {
    #[must_use]
    pub fn new_strategy(self) -> Box<dyn InterpolationStrategy> {
        match self {
            PlaceholderStyle::Question => Box::new(QuestionMarkStrategy),
            PlaceholderStyle::Postgres => Box::new(DollarNumberedStrategy::default()),
            PlaceholderStyle::Sqlite => Box::new(QuestionNumberedStrategy::default()),
        }
    }
}

type FactoryFn = dyn Fn() -> Box<dyn InterpolationStrategy> + Send + Sync;

/// Stateless, shareable producer of fresh [`InterpolationStrategy`] instances.
///
/// ```rust
/// use sql_engine_adapter::prelude::*;
///
/// let factory = StrategyFactory::for_style(PlaceholderStyle::Postgres);
/// let query = Query::positional("select * from t where a = ? and b = ?", vec![
///     RowValues::Int(1),
///     RowValues::Int(2),
/// ]);
/// let (sql, args) = query.interpolate(factory.create().as_mut()).unwrap();
/// assert_eq!(sql, "select * from t where a = $1 and b = $2");
/// assert_eq!(args.len(), 2);
/// ```
#[derive(Clone)]
pub struct StrategyFactory {
    make: Arc<FactoryFn>,
}

impl StrategyFactory {
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> Box<dyn InterpolationStrategy> + Send + Sync + 'static,
    {
        Self {
            make: Arc::new(make),
        }
    }

    #[must_use]
    pub fn for_style(style: PlaceholderStyle) -> Self {
        Self::new(move || style.new_strategy())
    }

    /// A new strategy instance with fresh state.
    #[must_use]
    pub fn create(&self) -> Box<dyn InterpolationStrategy> {
        (self.make)()
    }
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFactory").finish_non_exhaustive()
    }
}
