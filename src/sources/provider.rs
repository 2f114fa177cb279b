use crate::session::{AuthTokenListener, CorrelationId};

/// Host-side source of raw session credentials.
///
/// `request_token` is fire-and-forget: the provider must eventually answer
/// through exactly one of [`AuthTokenListener::on_success`] or
/// [`AuthTokenListener::on_failure`] with the same correlation id. The
/// coordinator never issues a second request before the first one resolved.
pub trait AuthTokenProvider: Send + Sync {
    fn request_token(&self, correlation_id: CorrelationId, listener: AuthTokenListener);
}

/// Any closure with the right shape is a provider.
impl<F> AuthTokenProvider for F
where
    F: Fn(CorrelationId, AuthTokenListener) + Send + Sync,
{
    fn request_token(&self, correlation_id: CorrelationId, listener: AuthTokenListener) {
        self(correlation_id, listener)
    }
}
