//! Superseding in-flight layouts.

use tokio_util::sync::CancellationToken;

/// Hands out one [`CancellationToken`] per layout invocation and cancels the
/// previous invocation's token whenever a new one begins.
///
/// Owned by whoever watches the inputs (e.g. a render loop); it holds no
/// results, only the token of the most recent invocation.
#[derive(Debug, Default)]
pub struct Relayout {
  current: Option<CancellationToken>,
}

impl Relayout {
  pub fn new() -> Self { Self::default() }

  /// Cancel the in-flight layout, if any, and return a token for the next.
  pub fn begin(&mut self) -> CancellationToken {
    self.cancel();
    let token = CancellationToken::new();
    self.current = Some(token.clone());
    token
  }

  pub fn cancel(&mut self) {
    if let Some(previous) = self.current.take() {
      previous.cancel();
    }
  }
}
