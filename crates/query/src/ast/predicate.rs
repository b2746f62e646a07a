//! Predicate definitions for query filtering.
//!
//! A `Where` clause is one of three terms:
//!
//! - a plain test closure over a record,
//! - a binary test comparing a field (or computed term) against a value,
//!   a pattern or a computed value,
//! - a union of clauses combined with `and` / `or`.

use regex::Regex;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tessera_core::{Error, Key, Result, Value};
use tracing::warn;

/// Read access to a record, as seen by predicates.
pub trait RecordView {
    /// The record's key.
    fn key(&self) -> &Key;

    /// The record's current value, if it exists.
    fn data(&self) -> Option<Value>;

    /// One field of the record's value.
    fn get(&self, field: &str) -> Option<Value> {
        self.data().and_then(|data| data.get(field).cloned())
    }
}

/// Closure form of a record test.
pub type RecordTest = Rc<dyn Fn(&dyn RecordView) -> bool>;

/// Closure computing a value from a record.
pub type RecordFn = Rc<dyn Fn(&dyn RecordView) -> Value>;

/// Comparison operator of a binary test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Deep structural equality.
    Same,
    /// Regex match against the stringified term.
    Matches,
    /// Alias of `Matches`.
    Re,
}

impl BinaryOp {
    fn is_pattern(self) -> bool {
        matches!(self, BinaryOp::Matches | BinaryOp::Re)
    }
}

impl FromStr for BinaryOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" | "=" | "==" => Ok(BinaryOp::Eq),
            "ne" | "!=" => Ok(BinaryOp::Ne),
            "gt" | ">" => Ok(BinaryOp::Gt),
            "lt" | "<" => Ok(BinaryOp::Lt),
            "gte" | ">=" => Ok(BinaryOp::Gte),
            "lte" | "<=" => Ok(BinaryOp::Lte),
            "same" => Ok(BinaryOp::Same),
            "matches" => Ok(BinaryOp::Matches),
            "re" => Ok(BinaryOp::Re),
            other => Err(Error::query(format!("unknown test type: {}", other))),
        }
    }
}

/// Boolean combinator of a union.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl FromStr for BoolOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "and" | "&" | "&&" => Ok(BoolOp::And),
            "or" | "|" | "||" => Ok(BoolOp::Or),
            other => Err(Error::query(format!("unknown boolean operator: {}", other))),
        }
    }
}

/// Left-hand side of a binary test.
#[derive(Clone)]
pub enum Term {
    Field(String),
    Computed(RecordFn),
}

/// Right-hand side of a binary test.
#[derive(Clone)]
pub enum Against {
    Value(Value),
    Pattern(Regex),
    Computed(RecordFn),
}

/// A single comparison.
#[derive(Clone)]
pub struct BinaryTest {
    term: Term,
    op: BinaryOp,
    against: Against,
}

impl BinaryTest {
    /// Builds a test. String values used with `matches`/`re` are compiled
    /// here, so a bad pattern fails at construction.
    pub fn new(term: Term, op: BinaryOp, against: Against) -> Result<Self> {
        let against = match (op.is_pattern(), against) {
            (true, Against::Value(Value::String(pattern))) => {
                Against::Pattern(compile_pattern(&pattern)?)
            }
            (true, Against::Value(other)) => {
                return Err(Error::query(format!(
                    "pattern test needs a string or regex, got {}",
                    other
                )))
            }
            (false, Against::Pattern(_)) => {
                return Err(Error::query(format!(
                    "{:?} test cannot compare against a regex",
                    op
                )))
            }
            (_, against) => against,
        };
        Ok(Self { term, op, against })
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }

    pub fn eval(&self, record: &dyn RecordView) -> bool {
        let term = match &self.term {
            Term::Field(field) => record.get(field).unwrap_or(Value::Null),
            Term::Computed(f) => f(record),
        };

        if self.op.is_pattern() {
            return match &self.against {
                Against::Pattern(re) => re.is_match(&term.to_string()),
                Against::Computed(f) => match f(record) {
                    Value::String(pattern) => match Regex::new(&pattern) {
                        Ok(re) => re.is_match(&term.to_string()),
                        Err(err) => {
                            warn!(%pattern, %err, "computed pattern does not compile");
                            false
                        }
                    },
                    other => {
                        warn!(against = %other, "pattern test against a non-string value");
                        false
                    }
                },
                Against::Value(_) => false,
            };
        }

        let against = match &self.against {
            Against::Value(v) => v.clone(),
            Against::Computed(f) => f(record),
            Against::Pattern(_) => return false,
        };

        match self.op {
            BinaryOp::Eq | BinaryOp::Same => term == against,
            BinaryOp::Ne => term != against,
            BinaryOp::Gt => term.compare(&against).map(|o| o.is_gt()).unwrap_or(false),
            BinaryOp::Lt => term.compare(&against).map(|o| o.is_lt()).unwrap_or(false),
            BinaryOp::Gte => term.compare(&against).map(|o| o.is_ge()).unwrap_or(false),
            BinaryOp::Lte => term.compare(&against).map(|o| o.is_le()).unwrap_or(false),
            BinaryOp::Matches | BinaryOp::Re => false,
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::query(format!("bad pattern {}: {}", pattern, e)))
}

/// A where clause.
#[derive(Clone)]
pub enum Where {
    Test(RecordTest),
    Binary(BinaryTest),
    Union { bool_op: BoolOp, tests: Vec<Where> },
}

impl Where {
    /// A plain test closure.
    pub fn test<F>(f: F) -> Self
    where
        F: Fn(&dyn RecordView) -> bool + 'static,
    {
        Where::Test(Rc::new(f))
    }

    /// Starts a binary test on a field.
    pub fn field(name: impl Into<String>) -> FieldTest {
        FieldTest {
            term: Term::Field(name.into()),
        }
    }

    /// Starts a binary test on a computed term.
    pub fn term<F>(f: F) -> FieldTest
    where
        F: Fn(&dyn RecordView) -> Value + 'static,
    {
        FieldTest {
            term: Term::Computed(Rc::new(f)),
        }
    }

    /// Builds a binary test from an operator name such as `"eq"`, `">="` or `"re"`.
    pub fn compare(field: impl Into<String>, test: &str, against: impl Into<Value>) -> Result<Self> {
        let op = test.parse::<BinaryOp>()?;
        Ok(Where::Binary(BinaryTest::new(
            Term::Field(field.into()),
            op,
            Against::Value(against.into()),
        )?))
    }

    pub fn and(tests: Vec<Where>) -> Self {
        Where::Union {
            bool_op: BoolOp::And,
            tests,
        }
    }

    pub fn or(tests: Vec<Where>) -> Self {
        Where::Union {
            bool_op: BoolOp::Or,
            tests,
        }
    }

    /// Evaluates the clause against a record.
    pub fn matches(&self, record: &dyn RecordView) -> bool {
        match self {
            Where::Test(f) => f(record),
            Where::Binary(test) => test.eval(record),
            // an empty union matches nothing
            Where::Union { tests, .. } if tests.is_empty() => false,
            Where::Union {
                bool_op: BoolOp::And,
                tests,
            } => tests.iter().all(|t| t.matches(record)),
            Where::Union {
                bool_op: BoolOp::Or,
                tests,
            } => tests.iter().any(|t| t.matches(record)),
        }
    }
}

impl fmt::Debug for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Where::Test(_) => write!(f, "Test(<fn>)"),
            Where::Binary(test) => {
                let term = match &test.term {
                    Term::Field(name) => name.clone(),
                    Term::Computed(_) => "<fn>".to_string(),
                };
                let against = match &test.against {
                    Against::Value(v) => v.to_string(),
                    Against::Pattern(re) => format!("/{}/", re.as_str()),
                    Against::Computed(_) => "<fn>".to_string(),
                };
                write!(f, "Binary({} {:?} {})", term, test.op, against)
            }
            Where::Union { bool_op, tests } => f
                .debug_struct("Union")
                .field("bool_op", bool_op)
                .field("tests", tests)
                .finish(),
        }
    }
}

/// Builder for binary tests; finish it with an operator.
pub struct FieldTest {
    term: Term,
}

impl FieldTest {
    fn value(self, op: BinaryOp, against: impl Into<Value>) -> Where {
        Where::Binary(BinaryTest {
            term: self.term,
            op,
            against: Against::Value(against.into()),
        })
    }

    pub fn eq(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Eq, against)
    }

    pub fn ne(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Ne, against)
    }

    pub fn gt(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Gt, against)
    }

    pub fn lt(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Lt, against)
    }

    pub fn gte(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Gte, against)
    }

    pub fn lte(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Lte, against)
    }

    pub fn same(self, against: impl Into<Value>) -> Where {
        self.value(BinaryOp::Same, against)
    }

    /// Regex test against the stringified term.
    pub fn matches(self, pattern: Regex) -> Where {
        Where::Binary(BinaryTest {
            term: self.term,
            op: BinaryOp::Matches,
            against: Against::Pattern(pattern),
        })
    }

    /// Regex test from pattern source; fails on a pattern that does not compile.
    pub fn re(self, pattern: &str) -> Result<Where> {
        Ok(Where::Binary(BinaryTest {
            term: self.term,
            op: BinaryOp::Re,
            against: Against::Pattern(compile_pattern(pattern)?),
        }))
    }

    /// Compares against a value computed from the same record.
    pub fn against<F>(self, op: BinaryOp, f: F) -> Where
    where
        F: Fn(&dyn RecordView) -> Value + 'static,
    {
        Where::Binary(BinaryTest {
            term: self.term,
            op,
            against: Against::Computed(Rc::new(f)),
        })
    }
}
