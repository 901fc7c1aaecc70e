//! Module and expression structure of a partitioned model.

use crate::{ModuleError, Result};
use galena_core::Device;

/// Expression in the entry function's body.
///
/// The entry function of a partitioned module only glues partition calls
/// together, so the expression language is deliberately small: variables,
/// calls, tuples, and tuple projections.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to an entry-function parameter (a model input).
    Var(String),

    /// Call to a global partition function.
    Call(Call),

    /// Tuple of result expressions.
    Tuple(Vec<Expr>),

    /// Projection of one field out of a tuple-valued expression.
    TupleGetItem { tuple: Box<Expr>, index: usize },
}

/// A call expression: callee name plus argument expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
}

impl Expr {
    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    /// Call expression.
    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call(Call {
            callee: callee.into(),
            args,
        })
    }

    /// Tuple projection of `self` at `index`.
    pub fn get(self, index: usize) -> Expr {
        Expr::TupleGetItem {
            tuple: Box::new(self),
            index,
        }
    }
}

/// The partitioned module's entry function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// Parameter names, representing the flattened model inputs.
    pub params: Vec<String>,
    /// Glue body: a tuple of outputs, or a single output expression.
    pub body: Expr,
}

/// A compiled partition function, tagged with its target device at partition
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalFunction {
    pub name: String,
    pub params: Vec<String>,
    pub device: Device,
}

/// Output of the external compiler's partitioning passes: the entry function
/// plus the global partition functions it calls.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedModule {
    pub main: Function,
    pub functions: Vec<GlobalFunction>,
}

impl PartitionedModule {
    /// Look up a partition function by name.
    pub fn function(&self, name: &str) -> Option<&GlobalFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Calls to partition functions in the entry body, in dataflow order
    /// (arguments before their consumer), one entry per callee.
    pub fn call_sites(&self) -> Vec<&Call> {
        let mut sites: Vec<&Call> = Vec::new();
        collect_calls(&self.main.body, &mut |call| {
            if self.function(&call.callee).is_some()
                && !sites.iter().any(|seen| seen.callee == call.callee)
            {
                sites.push(call);
            }
        });
        sites
    }

    /// Check that the entry body only references known functions and
    /// parameters.
    pub fn validate(&self) -> Result<()> {
        validate_expr(&self.main.body, self)
    }
}

fn validate_expr(expr: &Expr, module: &PartitionedModule) -> Result<()> {
    match expr {
        Expr::Var(name) => {
            if module.main.params.iter().any(|p| p == name) {
                Ok(())
            } else {
                Err(ModuleError::UnknownVariable(name.clone()))
            }
        }
        Expr::Call(call) => {
            if module.function(&call.callee).is_none() {
                return Err(ModuleError::UnknownFunction(call.callee.clone()));
            }
            for arg in &call.args {
                validate_expr(arg, module)?;
            }
            Ok(())
        }
        Expr::Tuple(fields) => {
            for field in fields {
                validate_expr(field, module)?;
            }
            Ok(())
        }
        Expr::TupleGetItem { tuple, .. } => validate_expr(tuple, module),
    }
}

fn collect_calls<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Call)) {
    match expr {
        Expr::Var(_) => {}
        Expr::Call(call) => {
            for arg in &call.args {
                collect_calls(arg, visit);
            }
            visit(call);
        }
        Expr::Tuple(fields) => {
            for field in fields {
                collect_calls(field, visit);
            }
        }
        Expr::TupleGetItem { tuple, .. } => collect_calls(tuple, visit),
    }
}
