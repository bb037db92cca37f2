//! Conversation runtime: owns the transcript and resolves function calls until
//! the model produces a final answer.
//!
//! One round is one request/response exchange. A `function_call` finish reason
//! makes the conversation invoke the named function, append the call and its
//! result to the working transcript, and start another round. The owned history
//! is only updated once a final answer arrives; a failed, cancelled or dropped
//! call leaves it untouched.

use crate::client::core::ChatClient;
use crate::client::stream;
use crate::functions::Invoker;
use crate::types::{
    ChatHistory, ChatMessage, ChatRequest, ChatResponse, FinishReason, FunctionCall,
    FunctionCallPolicy, Role,
};
use crate::{BoxStream, Error, ErrorContext, Result};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What to do when a requested function cannot be run or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationFailurePolicy {
    /// Abort the call with the error.
    #[default]
    Propagate,
    /// Send `{"error": "<message>"}` back as the function result so the model can
    /// react. Applies to argument conversion failures, handler failures and
    /// unknown function names.
    ReportToModel,
}

/// Per-conversation request settings.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub repetition_penalty: Option<f32>,
    pub function_call: FunctionCallPolicy,
}

impl ChatSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            repetition_penalty: None,
            function_call: FunctionCallPolicy::Auto,
        }
    }
}

/// Request plus what is needed to commit its outcome.
pub(crate) struct Prepared {
    pub request: ChatRequest,
    /// System turn that was prepended to the request.
    pub system: Option<ChatMessage>,
    /// Index of the first turn not taken from the base history.
    pub first_new: usize,
}

impl Prepared {
    /// Turns added by this call, the final answer included.
    pub fn into_new_turns(mut self) -> (Option<ChatMessage>, Vec<ChatMessage>) {
        let new = self.request.messages.split_off(self.first_new);
        (self.system, new)
    }
}

/// Append the outcome of one call to `history`. The system turn is only kept
/// when it becomes the first turn of the transcript.
pub(crate) fn commit(history: &mut ChatHistory, system: Option<ChatMessage>, new_turns: Vec<ChatMessage>) {
    if history.is_empty() {
        if let Some(system) = system {
            history.push(system);
        }
    }
    history.extend(new_turns);
}

/// Look up and invoke the requested function, applying the failure policy.
pub(crate) fn run_function(
    client: &ChatClient,
    policy: InvocationFailurePolicy,
    call: &FunctionCall,
) -> Result<String> {
    let outcome = match client.registry.lookup(&call.name) {
        Some(function) => Invoker::invoke(&function, &call.arguments),
        None => Err(Error::FunctionNotFound(call.name.clone())),
    };
    match outcome {
        Err(e) if policy == InvocationFailurePolicy::ReportToModel && e.is_invocation_failure() => {
            warn!(
                function = call.name.as_str(),
                error = %e,
                "function failed; reporting to model"
            );
            Ok(serde_json::json!({ "error": e.to_string() }).to_string())
        }
        other => other,
    }
}

/// The function-call turn followed by the turn carrying its result.
pub(crate) fn call_turns(
    call_turn: ChatMessage,
    call: FunctionCall,
    result: String,
) -> [ChatMessage; 2] {
    let state_id = call_turn.functions_state_id.clone();
    [
        call_turn,
        ChatMessage::function_result(call.name, result, state_id),
    ]
}

pub(crate) fn unexpected_finish(round: usize, reason: Option<FinishReason>) -> Error {
    Error::protocol_with_context(
        "unexpected finish reason",
        ErrorContext::new()
            .with_field_path("choices[0].finish_reason")
            .with_details(format!("round {}: {:?}", round, reason))
            .with_source("conversation"),
    )
}

/// A conversation with the model. Not meant for concurrent use: calls take
/// `&mut self` while they may change the history.
pub struct Conversation {
    client: ChatClient,
    history: ChatHistory,
    system_prompt: Option<String>,
    settings: ChatSettings,
    failure_policy: InvocationFailurePolicy,
}

impl Conversation {
    pub fn new(client: ChatClient) -> Self {
        let settings = ChatSettings::new(client.config().model.clone());
        Self {
            client,
            history: ChatHistory::new(),
            system_prompt: None,
            settings,
            failure_policy: InvocationFailurePolicy::default(),
        }
    }

    /// Sent first on every request whose history does not already start with a
    /// system turn.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_history(mut self, history: ChatHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_failure_policy(mut self, policy: InvocationFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ChatSettings {
        &mut self.settings
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Ask `prompt` and wait for the final answer, resolving function calls on the
    /// way. On success the prompt, every call/result pair and the answer are
    /// appended to the history.
    pub async fn ask(&mut self, prompt: &str, cancel: &CancellationToken) -> Result<ChatResponse> {
        let prepared = self.prepare(self.history.messages(), false, prompt);
        let (response, prepared) =
            run_buffered(&self.client, self.failure_policy, prepared, cancel).await?;
        let (system, new_turns) = prepared.into_new_turns();
        commit(&mut self.history, system, new_turns);
        Ok(response)
    }

    /// Like [`Conversation::ask`] but based on `history` instead of the owned
    /// history, which is left untouched. A trailing user turn in `history` is
    /// replaced by `prompt`.
    pub async fn ask_with_history(
        &self,
        prompt: &str,
        history: &ChatHistory,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let prepared = self.prepare(history.messages(), true, prompt);
        let (response, _) = run_buffered(&self.client, self.failure_policy, prepared, cancel).await?;
        Ok(response)
    }

    /// Ask `prompt` and receive the answer as content deltas.
    ///
    /// Function-call fragments are not yielded; a round that ends with a call
    /// invokes it and continues with a new streamed request. Text already yielded
    /// is never retracted. The history is updated when the stream completes.
    pub fn ask_stream<'a>(
        &'a mut self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> BoxStream<'a, String> {
        let prepared = self.prepare(self.history.messages(), false, prompt);
        stream::conversation_stream(
            self.client.clone(),
            self.failure_policy,
            prepared,
            Some(&mut self.history),
            cancel.clone(),
        )
    }

    /// Streamed variant of [`Conversation::ask_with_history`].
    pub fn ask_stream_with_history(
        &self,
        prompt: &str,
        history: &ChatHistory,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, String> {
        let prepared = self.prepare(history.messages(), true, prompt);
        stream::conversation_stream(
            self.client.clone(),
            self.failure_policy,
            prepared,
            None,
            cancel.clone(),
        )
    }

    /// Working transcript: system turn (unless the base already starts with one),
    /// the base history, then the new user turn.
    fn prepare(&self, base: &[ChatMessage], caller_supplied: bool, prompt: &str) -> Prepared {
        let base = match base.split_last() {
            Some((last, rest)) if caller_supplied && last.role == Role::User => rest,
            _ => base,
        };

        let system = match (&self.system_prompt, base.first()) {
            (Some(_), Some(first)) if first.role == Role::System => None,
            (Some(prompt), _) => Some(ChatMessage::system(prompt.clone())),
            (None, _) => None,
        };

        let mut messages = Vec::with_capacity(base.len() + 2);
        messages.extend(system.iter().cloned());
        messages.extend_from_slice(base);
        let first_new = messages.len();
        messages.push(ChatMessage::user(prompt));

        let mut request = ChatRequest::new(self.settings.model.clone(), messages)
            .with_functions(self.client.registry.schemas(), self.settings.function_call.clone());
        request.temperature = self.settings.temperature;
        request.top_p = self.settings.top_p;
        request.max_tokens = self.settings.max_tokens;
        request.repetition_penalty = self.settings.repetition_penalty;

        Prepared {
            request,
            system,
            first_new,
        }
    }
}

/// Buffered rounds until a final answer. Returns the final response and the
/// prepared request holding every turn exchanged.
async fn run_buffered(
    client: &ChatClient,
    policy: InvocationFailurePolicy,
    mut prepared: Prepared,
    cancel: &CancellationToken,
) -> Result<(ChatResponse, Prepared)> {
    let start = Instant::now();
    let mut round = 0usize;

    loop {
        round += 1;
        let response = client.chat(&prepared.request, cancel).await?;
        let choice = response.first_choice().ok_or_else(|| {
            Error::protocol_with_context(
                "response has no choices",
                ErrorContext::new().with_source("conversation"),
            )
        })?;
        let reason = choice.finish_reason;
        info!(
            round,
            model = prepared.request.model.as_str(),
            finish_reason = ?reason,
            "conversation round"
        );

        match reason {
            Some(FinishReason::FunctionCall) => {
                let call_turn = choice.message.clone();
                let call = call_turn
                    .function_call
                    .clone()
                    .ok_or_else(|| unexpected_finish(round, reason))?;
                let result = run_function(client, policy, &call)?;
                prepared
                    .request
                    .messages
                    .extend(call_turns(call_turn, call, result));
            }
            Some(FinishReason::Stop)
            | Some(FinishReason::Length)
            | Some(FinishReason::Blacklisted)
            | None => {
                prepared.request.messages.push(choice.message.clone());
                info!(
                    rounds = round,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "conversation answered"
                );
                return Ok((response, prepared));
            }
            Some(FinishReason::Unknown) => return Err(unexpected_finish(round, reason)),
        }
    }
}
