use crate::types::{Delta, FunctionCall};
use serde_json::Value;

/// Collects the function-call fragments of one streamed round into a single call.
///
/// Arguments may arrive whole (a JSON object) or as string pieces that only form
/// valid JSON once concatenated. Tolerant: if the pieces never parse, the raw
/// string is kept and left for argument marshalling to reject.
#[derive(Debug, Default)]
pub struct FunctionCallAssembler {
    name: Option<String>,
    arguments: Partial,
    state_id: Option<String>,
}

#[derive(Debug, Default)]
enum Partial {
    #[default]
    Empty,
    Json(Value),
    Text(String),
}

impl FunctionCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb `delta` if it belongs to a function call. Returns false for plain content.
    pub fn on_delta(&mut self, delta: &Delta) -> bool {
        if !delta.carries_function_call() {
            return false;
        }
        if let Some(id) = &delta.functions_state_id {
            self.state_id = Some(id.clone());
        }
        if let Some(call) = &delta.function_call {
            if let Some(name) = call.name.as_deref().filter(|n| !n.is_empty()) {
                self.name = Some(name.to_string());
            }
            if let Some(args) = &call.arguments {
                self.on_arguments(args);
            }
        }
        true
    }

    fn on_arguments(&mut self, fragment: &Value) {
        match (fragment, &mut self.arguments) {
            (Value::String(piece), Partial::Text(buf)) => buf.push_str(piece),
            (Value::String(piece), slot) => *slot = Partial::Text(piece.clone()),
            (Value::Null, _) => {}
            (value, slot) => *slot = Partial::Json(value.clone()),
        }
    }

    /// The assembled call and its state id, if a function name was seen.
    pub fn finalize(self) -> Option<(FunctionCall, Option<String>)> {
        let name = self.name?;
        let arguments = match self.arguments {
            Partial::Empty => Value::Object(Default::default()),
            Partial::Json(v) => v,
            Partial::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(trimmed).unwrap_or(Value::String(s))
                }
            }
        };
        Some((FunctionCall { name, arguments }, self.state_id))
    }
}
