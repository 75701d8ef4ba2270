use async_trait::async_trait;
use clap::ValueEnum;
use spindle_core::{Handler, HandlerError};

/// Computation the console worker applies to each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// Echo the value back.
    Passthrough,
    /// Multiply the value by two.
    Double,
}

pub struct Arithmetic {
    op: Operation,
}

impl Arithmetic {
    pub fn new(op: Operation) -> Self {
        Self { op }
    }
}

#[async_trait]
impl Handler for Arithmetic {
    type Input = i32;
    type Output = i32;

    async fn handle(&self, input: i32) -> Result<i32, HandlerError> {
        match self.op {
            Operation::Passthrough => Ok(input),
            Operation::Double => input
                .checked_mul(2)
                .ok_or_else(|| HandlerError::new(format!("{input} * 2 overflows"))),
        }
    }
}
