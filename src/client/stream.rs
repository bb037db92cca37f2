//! Streamed conversation rounds as an explicit state machine.
//!
//! `Requesting` opens a streamed request, `Reading` forwards content deltas and
//! buffers function-call fragments. At end of stream a buffered call is invoked
//! and the machine goes back to `Requesting`; otherwise the round was final, the
//! history is committed and the machine is `Done`. The open connection lives in
//! `Reading` and is released as soon as the state is left or the stream dropped.

use crate::client::conversation::{
    call_turns, commit, run_function, unexpected_finish, InvocationFailurePolicy, Prepared,
};
use crate::client::core::ChatClient;
use crate::types::{ChatChunk, ChatHistory, ChatMessage, FinishReason};
use crate::utils::FunctionCallAssembler;
use crate::{BoxStream, Error, Result};
use futures::{stream, StreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

enum Phase {
    Requesting,
    Reading(BoxStream<'static, ChatChunk>),
    Done,
}

struct State<'a> {
    client: ChatClient,
    policy: InvocationFailurePolicy,
    prepared: Option<Prepared>,
    history: Option<&'a mut ChatHistory>,
    cancel: CancellationToken,
    phase: Phase,
    round: usize,
    started: Instant,
    content: String,
    assembler: FunctionCallAssembler,
    finish: Option<FinishReason>,
}

impl State<'_> {
    fn fail(mut self, err: Error) -> Option<(Result<String>, Self)> {
        self.phase = Phase::Done;
        self.prepared = None;
        Some((Err(err), self))
    }

    /// End of one streamed round. Returns `Ok(true)` when another round follows.
    fn end_round(&mut self) -> Result<bool> {
        let assembler = std::mem::take(&mut self.assembler);
        let content = std::mem::take(&mut self.content);
        let finish = self.finish.take();
        info!(
            round = self.round,
            finish_reason = ?finish,
            content_len = content.len(),
            "conversation round"
        );

        let prepared = self
            .prepared
            .as_mut()
            .ok_or_else(|| Error::protocol("stream polled after completion"))?;

        if let Some((call, state_id)) = assembler.finalize() {
            let result = run_function(&self.client, self.policy, &call)?;
            let mut call_turn = ChatMessage::assistant(content);
            call_turn.function_call = Some(call.clone());
            call_turn.functions_state_id = state_id;
            prepared
                .request
                .messages
                .extend(call_turns(call_turn, call, result));
            return Ok(true);
        }

        match finish {
            Some(FinishReason::FunctionCall) | Some(FinishReason::Unknown) => {
                Err(unexpected_finish(self.round, finish))
            }
            _ => {
                prepared.request.messages.push(ChatMessage::assistant(content));
                if let (Some(history), Some(prepared)) = (self.history.as_deref_mut(), self.prepared.take()) {
                    let (system, new_turns) = prepared.into_new_turns();
                    commit(history, system, new_turns);
                }
                info!(
                    rounds = self.round,
                    duration_ms = self.started.elapsed().as_millis() as u64,
                    "conversation answered"
                );
                Ok(false)
            }
        }
    }
}

pub(crate) fn conversation_stream<'a>(
    client: ChatClient,
    policy: InvocationFailurePolicy,
    prepared: Prepared,
    history: Option<&'a mut ChatHistory>,
    cancel: CancellationToken,
) -> BoxStream<'a, String> {
    let state = State {
        client,
        policy,
        prepared: Some(prepared),
        history,
        cancel,
        phase: Phase::Requesting,
        round: 0,
        started: Instant::now(),
        content: String::new(),
        assembler: FunctionCallAssembler::new(),
        finish: None,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            match std::mem::replace(&mut st.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::Requesting => {
                    st.round += 1;
                    let opened = match st.prepared.as_ref() {
                        Some(p) => st.client.chat_stream(&p.request, &st.cancel).await,
                        None => return None,
                    };
                    match opened {
                        Ok(chunks) => st.phase = Phase::Reading(chunks),
                        Err(e) => return st.fail(e),
                    }
                }
                Phase::Reading(mut chunks) => {
                    let next = tokio::select! {
                        biased;
                        _ = st.cancel.cancelled() => Some(Err(Error::Cancelled)),
                        next = chunks.next() => next,
                    };
                    match next {
                        Some(Ok(chunk)) => {
                            st.phase = Phase::Reading(chunks);
                            let Some(choice) = chunk.choices.into_iter().next() else {
                                continue;
                            };
                            if choice.finish_reason.is_some() {
                                st.finish = choice.finish_reason;
                            }
                            if st.assembler.on_delta(&choice.delta) {
                                debug!(round = st.round, "buffered function-call fragment");
                                continue;
                            }
                            match choice.delta.content {
                                Some(text) if !text.is_empty() => {
                                    st.content.push_str(&text);
                                    return Some((Ok(text), st));
                                }
                                _ => continue,
                            }
                        }
                        Some(Err(e)) => return st.fail(e),
                        None => {
                            drop(chunks);
                            match st.end_round() {
                                Ok(true) => st.phase = Phase::Requesting,
                                Ok(false) => return None,
                                Err(e) => return st.fail(e),
                            }
                        }
                    }
                }
            }
        }
    }))
}
