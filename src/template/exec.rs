//! Evaluation of a parsed template against a field map.

use super::funcs;
use super::parse::{Command, Node, Operand, Pipeline};
use super::value::{Fields, Value};

/// An evaluation failure at a byte offset of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecFailure {
    pub pos: usize,
    pub node: String,
    pub message: String,
}

impl ExecFailure {
    fn at(operand: &Operand, message: impl Into<String>) -> Self {
        Self {
            pos: operand.pos(),
            node: operand.to_string(),
            message: message.into(),
        }
    }
}

type ExecResult<T> = Result<T, ExecFailure>;

/// Renders `nodes` into `out`.
pub(crate) fn execute(nodes: &[Node], fields: &Fields, out: &mut String) -> ExecResult<()> {
    Evaluator { fields }.walk(nodes, out)
}

struct Evaluator<'a> {
    fields: &'a Fields,
}

impl Evaluator<'_> {
    fn walk(&self, nodes: &[Node], out: &mut String) -> ExecResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.pipeline(pipeline)?;
                    out.push_str(&value.to_string());
                }
                Node::If(branch) => {
                    if self.pipeline(&branch.condition)?.is_truthy() {
                        self.walk(&branch.then, out)?;
                    } else {
                        self.walk(&branch.otherwise, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline) -> ExecResult<Value> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, piped)?);
        }
        piped.ok_or_else(|| ExecFailure {
            pos: pipeline.pos,
            node: pipeline.to_string(),
            message: "missing value for command".to_owned(),
        })
    }

    fn command(&self, command: &Command, piped: Option<Value>) -> ExecResult<Value> {
        let Some((first, rest)) = command.args.split_first() else {
            return Err(ExecFailure {
                pos: command.pos,
                node: command.to_string(),
                message: "empty command".to_owned(),
            });
        };
        if let Operand::Function { name, .. } = first {
            let mut args = rest
                .iter()
                .map(|operand| self.operand(operand))
                .collect::<ExecResult<Vec<_>>>()?;
            args.extend(piped);
            return funcs::call(name, &args, self.fields)
                .map_err(|message| ExecFailure::at(first, message));
        }
        if !rest.is_empty() || piped.is_some() {
            return Err(ExecFailure::at(
                first,
                format!("can't give argument to non-function {first}"),
            ));
        }
        self.operand(first)
    }

    fn operand(&self, operand: &Operand) -> ExecResult<Value> {
        match operand {
            Operand::Field { path, .. } => self.field(operand, path),
            Operand::Dot { .. } => Ok(Value::Map(self.fields.clone())),
            Operand::Function { name, .. } => funcs::call(name, &[], self.fields)
                .map_err(|message| ExecFailure::at(operand, message)),
            Operand::Str { value, .. } => Ok(Value::Str(value.clone())),
            Operand::Int { value, .. } => Ok(Value::Int(*value)),
            Operand::Bool { value, .. } => Ok(Value::Bool(*value)),
            Operand::Nested(pipeline) => self.pipeline(pipeline),
        }
    }

    fn field(&self, operand: &Operand, path: &[String]) -> ExecResult<Value> {
        let mut receiver = self.fields;
        let mut found: Option<&Value> = None;
        for segment in path {
            if let Some(value) = found {
                let Value::Map(map) = value else {
                    return Err(ExecFailure::at(
                        operand,
                        format!(
                            "can't evaluate field {segment} in type {}",
                            value.type_name()
                        ),
                    ));
                };
                receiver = map;
            }
            let Some(next) = receiver.get(segment) else {
                return Err(ExecFailure::at(
                    operand,
                    format!("map has no entry for key {segment:?}"),
                ));
            };
            found = Some(next);
        }
        Ok(found.cloned().unwrap_or_else(|| Value::Map(self.fields.clone())))
    }
}
