// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Outcome of one state machine step.
pub enum Transition<S, R> {
    Next(S, R),
    Stay(R),
    Done(R),
}

/// One state of a driven state machine; `step` performs the state's IO and
/// names the successor.
pub trait StateMachine<Ctx, Out>: Sized {
    type StepResult<'a>: Future<Output = Out> + Send + 'a
    where
        Self: 'a,
        Out: 'a,
        Ctx: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut Ctx) -> Self::StepResult<'a>;
}

/// A context that owns its current state and can drive itself to completion.
pub trait StateMachineCtx<Out> {
    fn execute(
        &mut self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Out>> + Send;
}
