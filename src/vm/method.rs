//! User methods
//!
//! The extension point a mutator program implements: given a fresh child
//! frame and the argument values, run and return either a handle held by
//! that frame or a primitive value.

use super::frames::FrameEnvironment;
use crate::runtime::memory::Word;
use crate::vm::VMResult;

/// A method the mutator can call through `FrameEnvironment::call_method`.
pub trait UserMethod: Send + Sync {
    /// Run against the callee's environment.
    fn invoke(
        &self,
        env: &FrameEnvironment,
        args: &[Word],
    ) -> VMResult<Word>;

    /// Name used in traces.
    fn name(&self) -> &str {
        "<anonymous>"
    }
}

impl<F> UserMethod for F
where
    F: Fn(&FrameEnvironment, &[Word]) -> VMResult<Word> + Send + Sync,
{
    fn invoke(
        &self,
        env: &FrameEnvironment,
        args: &[Word],
    ) -> VMResult<Word> {
        self(env, args)
    }
}

/// Pin a closure to the `UserMethod` signature so its argument types are
/// inferred.
///
/// ```
/// use gcharness::vm::user_method;
///
/// let identity = user_method(|_env, args| Ok(args.first().copied().unwrap_or(0)));
/// # let _ = identity;
/// ```
pub fn user_method<F>(f: F) -> F
where
    F: Fn(&FrameEnvironment, &[Word]) -> VMResult<Word> + Send + Sync,
{
    f
}

/// A user method with a name, for readable traces.
pub struct Named<F> {
    name: &'static str,
    body: F,
}

impl<F> Named<F>
where
    F: Fn(&FrameEnvironment, &[Word]) -> VMResult<Word> + Send + Sync,
{
    pub fn new(
        name: &'static str,
        body: F,
    ) -> Self {
        Self { name, body }
    }
}

impl<F> UserMethod for Named<F>
where
    F: Fn(&FrameEnvironment, &[Word]) -> VMResult<Word> + Send + Sync,
{
    fn invoke(
        &self,
        env: &FrameEnvironment,
        args: &[Word],
    ) -> VMResult<Word> {
        (self.body)(env, args)
    }

    fn name(&self) -> &str {
        self.name
    }
}
