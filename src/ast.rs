//! Abstract syntax tree produced by the parser.
//!
//! `Expression` is the tagged union of source values (§3 of the spec):
//! literals, references, and composites. `Statement` is the tagged union of
//! top-level blocks.

use std::collections::HashMap;

/// A source value as written in configuration, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    String(String),
    Number(f64),
    Boolean(bool),
    /// A dotted path of two or more identifiers, e.g. `var.x` or `module.app.id`.
    Reference(Vec<String>),
    List(Vec<Expression>),
    Map(HashMap<String, Expression>),
}

impl Expression {
    /// Render the expression back into its literal JSON-ish shape, used to
    /// stringify resolved values for interpolation splicing.
    pub fn as_reference(&self) -> Option<&[String]> {
        match self {
            Expression::Reference(parts) => Some(parts),
            _ => None,
        }
    }
}

pub type Attributes = HashMap<String, Expression>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStmt {
    pub resource_type: String,
    pub name: String,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataStmt {
    pub data_type: String,
    pub name: String,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableStmt {
    pub name: String,
    pub attrs: Attributes,
}

impl VariableStmt {
    pub fn default_value(&self) -> Option<&Expression> {
        self.attrs.get("default")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleStmt {
    pub name: String,
    pub attrs: Attributes,
}

impl ModuleStmt {
    pub fn source(&self) -> Option<&str> {
        match self.attrs.get("source") {
            Some(Expression::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attributes other than `source` — these become the child module's
    /// caller-supplied variable inputs.
    pub fn inputs(&self) -> impl Iterator<Item = (&String, &Expression)> {
        self.attrs.iter().filter(|(k, _)| k.as_str() != "source")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputStmt {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Resource(ResourceStmt),
    Data(DataStmt),
    Variable(VariableStmt),
    Module(ModuleStmt),
    Output(OutputStmt),
}

pub type Program = Vec<Statement>;
