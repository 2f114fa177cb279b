// Failure paths: provider errors, malformed tokens, timeouts, late or unknown
// correlation ids, callers that stop waiting.

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::SessionError;
    use crate::session::{CoordinatorOptions, CorrelationId, SessionCoordinator, SessionState};
    use crate::tests::common::{token, wait_for_waiters, RecordingProvider};

    fn with_timeout(timeout: Duration) -> CoordinatorOptions {
        CoordinatorOptions {
            provider_timeout: Some(timeout),
            ..CoordinatorOptions::default()
        }
    }

    async fn established(provider: &Arc<RecordingProvider>, coordinator: &SessionCoordinator) {
        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(coordinator, 1).await;
        provider.succeed(provider.calls() - 1, &token(3600));
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failure_keeps_a_still_fresh_configuration() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());
        established(&provider, &coordinator).await;
        let previous = coordinator.current().unwrap();

        let forced = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        let joined = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        wait_for_waiters(&coordinator, 2).await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(coordinator.state(), SessionState::Refreshing);

        provider.fail(1, "re-authentication cancelled by user");

        let expected = SessionError::AuthenticationTokenProvider("re-authentication cancelled by user".into());
        assert_eq!(forced.await.unwrap().unwrap_err(), expected);
        assert_eq!(joined.await.unwrap().unwrap_err(), expected);

        // previous session still serves without a provider round-trip
        assert_eq!(coordinator.state(), SessionState::Valid);
        let current = coordinator.get_configuration().await.unwrap();
        assert!(Arc::ptr_eq(&current, &previous));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn failure_without_previous_configuration_returns_to_empty() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        provider.fail(0, "offline");

        assert!(pending.await.unwrap().is_err());
        assert_eq!(coordinator.state(), SessionState::Empty);

        // the next call starts a fresh attempt
        let retry = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(provider.calls(), 2);
        provider.succeed(1, &token(3600));
        assert!(retry.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn malformed_token_is_surfaced_to_every_waiter() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.get_configuration().await })
            })
            .collect();
        wait_for_waiters(&coordinator, 3).await;

        provider.succeed(0, "not-a-session-token");

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, SessionError::MalformedToken(_)));
            assert!(!err.is_retryable());
        }
        assert_eq!(coordinator.state(), SessionState::Empty);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn answers_for_resolved_or_unknown_ids_are_ignored() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());
        established(&provider, &coordinator).await;
        let current = coordinator.current().unwrap();

        // second answer for the already resolved request
        provider.succeed(0, &token(60));
        provider.fail(0, "late failure");
        // answer nobody asked for
        coordinator.listener().on_success(CorrelationId::new(), token(120));

        let after = coordinator.current().unwrap();
        assert!(Arc::ptr_eq(&current, &after));
        assert_eq!(coordinator.state(), SessionState::Valid);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_all_waiters_and_ignores_late_answer() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), with_timeout(Duration::from_secs(5)));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.get_configuration().await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, SessionError::TokenProviderTimeout(Duration::from_secs(5)));
        }
        assert_eq!(provider.calls(), 1);
        assert_eq!(coordinator.state(), SessionState::Empty);
        assert_eq!(coordinator.waiting_callers(), 0);

        // the provider finally answers the timed-out request
        provider.succeed(0, &token(3600));
        assert_eq!(coordinator.state(), SessionState::Empty);
        assert!(coordinator.current().is_none());

        // and the next call dispatches a new request
        let retry = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(provider.calls(), 2);
        provider.succeed(1, &token(3600));
        assert!(retry.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_a_still_fresh_configuration() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), with_timeout(Duration::from_secs(5)));
        established(&provider, &coordinator).await;
        let previous = coordinator.current().unwrap();

        let forced = coordinator.refresh().await.unwrap_err();
        assert_eq!(forced, SessionError::TokenProviderTimeout(Duration::from_secs(5)));
        assert_eq!(provider.calls(), 2);

        assert_eq!(coordinator.state(), SessionState::Valid);
        let current = coordinator.get_configuration().await.unwrap();
        assert!(Arc::ptr_eq(&current, &previous));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unattended_request_expires_at_its_deadline() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), with_timeout(Duration::from_secs(5)));

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        abandoned.abort();
        wait_for_waiters(&coordinator, 0).await;
        assert_eq!(coordinator.state(), SessionState::Refreshing);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(coordinator.state(), SessionState::Empty);

        // a newcomer dispatches a new request instead of inheriting the timeout
        let newcomer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(provider.calls(), 2);
        let (first_id, _) = provider.request(0);
        let (second_id, _) = provider.request(1);
        assert_ne!(first_id, second_id);

        provider.succeed(1, &token(3600));
        assert!(newcomer.await.unwrap().is_ok());
        assert_eq!(coordinator.state(), SessionState::Valid);

        // the expired request is gone, its late answer changes nothing
        let current = coordinator.current().unwrap();
        provider.succeed(0, &token(60));
        assert!(Arc::ptr_eq(&coordinator.current().unwrap(), &current));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_waits_without_deadline() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), with_timeout(Duration::MAX));

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(coordinator.state(), SessionState::Refreshing);

        provider.succeed(0, &token(3600));
        assert!(pending.await.unwrap().is_ok());
        assert_eq!(coordinator.state(), SessionState::Valid);
    }

    #[tokio::test]
    async fn detached_caller_does_not_disturb_others() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        let patient = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 2).await;

        abandoned.abort();
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(coordinator.state(), SessionState::Refreshing);

        provider.succeed(0, &token(3600));
        assert!(patient.await.unwrap().is_ok());
        assert!(abandoned.await.unwrap_err().is_cancelled());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn detaching_last_waiter_keeps_the_request_in_flight() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        abandoned.abort();
        wait_for_waiters(&coordinator, 0).await;
        assert_eq!(coordinator.state(), SessionState::Refreshing);

        // a newcomer joins the same request instead of dispatching another
        let newcomer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        assert_eq!(provider.calls(), 1);

        provider.succeed(0, &token(3600));
        assert!(newcomer.await.unwrap().is_ok());
        assert_eq!(coordinator.state(), SessionState::Valid);
    }

    #[tokio::test]
    async fn answering_after_the_coordinator_is_dropped_is_harmless() {
        let provider = RecordingProvider::new();
        let coordinator = SessionCoordinator::new(provider.clone(), CoordinatorOptions::default());

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_configuration().await })
        };
        wait_for_waiters(&coordinator, 1).await;
        pending.abort();
        let _ = pending.await;
        drop(coordinator);

        provider.succeed(0, &token(3600));
        provider.fail(0, "gone");
    }
}
