//! Value generators produce the data attached to events.
//!
//! A generator is evaluated once per case and may fail; the failure is carried up
//! unchanged as [`SimulationError::ValueGenerator`](crate::error::SimulationError).

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::{BuildHasher, Hash, Hasher};
use std::process::Command;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// A data value recorded on an event or a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    String(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Value {
    /// Integers are recognised first, everything else is a string
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        text.parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

/// Anything that can produce a value for a given case id.
///
/// `Ok(None)` means the generator deliberately produced nothing for this case.
pub trait ValueGenerator: Debug + Send + Sync {
    fn evaluate(&self, case_id: &str) -> Result<Option<Value>, ValueError>;
}

/// Generators are shared between the process graph and every simulating thread
pub type SharedGenerator = Arc<dyn ValueGenerator>;

/// Always returns the same value
#[derive(Debug, Clone)]
pub struct Literal(pub Value);

impl ValueGenerator for Literal {
    fn evaluate(&self, _case_id: &str) -> Result<Option<Value>, ValueError> {
        Ok(Some(self.0.clone()))
    }
}

/// A uniformly distributed integer in `min..=max`.
///
/// The value only depends on the case id and the salt, so evaluating the same
/// case twice yields the same value.
#[derive(Debug, Clone)]
pub struct UniformInteger {
    pub min: i64,
    pub max: i64,
    pub salt: u64,
}

impl UniformInteger {
    pub fn new(min: i64, max: i64) -> Self {
        UniformInteger { min: min.min(max), max: min.max(max), salt: 0 }
    }

    pub fn with_salt(mut self, salt: u64) -> Self {
        self.salt = salt;
        self
    }

    fn seed(&self, case_id: &str) -> u64 {
        // Fixed keys so that seeds are stable across runs
        let mut hasher = ahash::RandomState::with_seeds(0x706c67, 0x76616c, 0x756e69, self.salt).build_hasher();
        case_id.hash(&mut hasher);
        hasher.finish()
    }
}

impl ValueGenerator for UniformInteger {
    fn evaluate(&self, case_id: &str) -> Result<Option<Value>, ValueError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed(case_id));
        Ok(Some(Value::Integer(rng.gen_range(self.min..=self.max))))
    }
}

/// A value computed by an arbitrary function of the case id
pub struct FnGenerator<F> {
    name: String,
    function: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> Result<Option<Value>, ValueError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, function: F) -> Self {
        FnGenerator { name: name.into(), function }
    }
}

impl<F> Debug for FnGenerator<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FnGenerator").field("name", &self.name).finish()
    }
}

impl<F> ValueGenerator for FnGenerator<F>
where
    F: Fn(&str) -> Result<Option<Value>, ValueError> + Send + Sync,
{
    fn evaluate(&self, case_id: &str) -> Result<Option<Value>, ValueError> {
        (self.function)(case_id)
    }
}

/// Runs an external program with the case id as its last argument and parses its
/// standard output. Empty output means no value.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        CommandGenerator { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl ValueGenerator for CommandGenerator {
    fn evaluate(&self, case_id: &str) -> Result<Option<Value>, ValueError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(case_id)
            .output()
            .map_err(|e| ValueError::Command { command: self.command_line(), reason: e.to_string() })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ValueError::Command {
                command: self.command_line(),
                reason: format!("{} {}", output.status, stderr.trim()),
            });
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ValueError::Unparsable(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        let text = stdout.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::parse(text)))
        }
    }
}

/// Wrap a literal value into a shareable generator
pub fn literal(value: impl Into<Value>) -> SharedGenerator {
    Arc::new(Literal(value.into()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_literal() {
        assert_eq!(literal(7).evaluate("case_1"), Ok(Some(Value::Integer(7))));
        assert_eq!(literal("x").evaluate("case_1"), Ok(Some(Value::String("x".into()))));
    }

    #[test]
    fn test_uniform_is_stable_per_case() {
        let generator = UniformInteger::new(10, 20).with_salt(3);
        for case in 0..50 {
            let case_id = format!("case_{}", case);
            let first = generator.evaluate(&case_id).unwrap();
            assert_eq!(first, generator.evaluate(&case_id).unwrap());
            match first {
                Some(Value::Integer(i)) => assert!((10..=20).contains(&i)),
                other => panic!("unexpected value {:?}", other),
            }
        }
    }

    #[test]
    fn test_fn_generator_error() {
        let generator = FnGenerator::new("failing", |case_id: &str| {
            Err(ValueError::Message(format!("no value for {}", case_id)))
        });
        assert_eq!(
            generator.evaluate("case_9"),
            Err(ValueError::Message("no value for case_9".into()))
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(Value::parse(" 42\n"), Value::Integer(42));
        assert_eq!(Value::parse("forty-two"), Value::String("forty-two".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator() {
        let generator = CommandGenerator::new("echo").arg("id");
        assert_eq!(generator.evaluate("case_3"), Ok(Some(Value::String("id case_3".into()))));
        let missing = CommandGenerator::new("this-program-does-not-exist-plg");
        assert!(matches!(missing.evaluate("case_3"), Err(ValueError::Command { .. })));
    }
}
