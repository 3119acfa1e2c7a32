mod common;

use std::sync::Arc;

use common::{CLIENT_ID, Fixture, RecordingRevoker, consent_request, token_request};
use gatehouse_auth::{
    AuthError, AuthenticationSession, ConsentManager, DefaultSession,
    ForcedObfuscatedAuthenticationSession, HandledAuthenticationRequest, HandledConsentRequest,
    OAuth2Storage, Pagination, RequestDeniedError,
};
use gatehouse_auth_datastore::TokenKind;
use time::{Duration, OffsetDateTime};

fn remembered(challenge: &str) -> HandledConsentRequest {
    HandledConsentRequest {
        challenge: challenge.to_string(),
        granted_scope: vec!["openid".into()],
        remember: true,
        ..HandledConsentRequest::default()
    }
}

#[tokio::test]
async fn consent_request_round_trip() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));

    let mut request = consent_request("c-1", "alice");
    request.oidc_context.login_hint = "alice@example.com".into();
    consent.create_consent_request(&request).await.unwrap();

    let stored = consent.get_consent_request("c-1").await.unwrap();
    assert_eq!(stored.verifier, "c-1-verifier");
    assert_eq!(stored.client.client_id, CLIENT_ID);
    assert_eq!(stored.requested_scope, vec!["openid", "offline"]);
    assert_eq!(stored.oidc_context.login_hint, "alice@example.com");
    assert!(stored.requested_at.is_some());

    let err = consent.get_consent_request("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn verifier_redeems_once() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    consent
        .create_consent_request(&consent_request("c-1", "alice"))
        .await
        .unwrap();

    let request = consent
        .handle_consent_request("c-1", &remembered("c-1"))
        .await
        .unwrap();
    assert_eq!(request.challenge, "c-1");

    let handled = consent
        .verify_and_invalidate_consent_request("c-1-verifier")
        .await
        .unwrap();
    assert!(handled.was_used);
    assert_eq!(handled.granted_scope, vec!["openid"]);
    assert_eq!(
        handled.consent_request.map(|r| r.subject),
        Some("alice".to_string())
    );

    let err = consent
        .verify_and_invalidate_consent_request("c-1-verifier")
        .await
        .unwrap_err();
    assert!(err.is_already_used());
}

#[tokio::test]
async fn unknown_verifier_is_internal_error() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));

    let err = consent
        .verify_and_invalidate_consent_request("nope")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Internal { .. }));
}

#[tokio::test]
async fn unhandled_verifier_is_not_found() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    consent
        .create_consent_request(&consent_request("c-1", "alice"))
        .await
        .unwrap();

    let err = consent
        .verify_and_invalidate_consent_request("c-1-verifier")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn concurrent_redemptions_succeed_once() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    consent
        .create_consent_request(&consent_request("c-1", "alice"))
        .await
        .unwrap();
    consent
        .handle_consent_request("c-1", &remembered("c-1"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        consent.verify_and_invalidate_consent_request("c-1-verifier"),
        consent.verify_and_invalidate_consent_request("c-1-verifier"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results
        .into_iter()
        .find_map(Result::err)
        .unwrap();
    assert!(err.is_already_used() || err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn handling_twice_is_rejected() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    consent
        .create_consent_request(&consent_request("c-1", "alice"))
        .await
        .unwrap();
    consent
        .handle_consent_request("c-1", &remembered("c-1"))
        .await
        .unwrap();

    let err = consent
        .handle_consent_request("c-1", &remembered("c-1"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn previously_granted_filters_and_paginates() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    let now = OffsetDateTime::now_utc();

    for challenge in ["keep-1", "keep-2", "forgotten", "denied", "expired", "skipped", "unhandled"] {
        let mut request = consent_request(challenge, "alice");
        request.skip = challenge == "skipped";
        consent.create_consent_request(&request).await.unwrap();
    }

    consent
        .handle_consent_request("keep-1", &remembered("keep-1"))
        .await
        .unwrap();
    consent
        .handle_consent_request("keep-2", &remembered("keep-2"))
        .await
        .unwrap();
    consent
        .handle_consent_request(
            "forgotten",
            &HandledConsentRequest {
                remember: false,
                ..remembered("forgotten")
            },
        )
        .await
        .unwrap();
    consent
        .handle_consent_request(
            "denied",
            &HandledConsentRequest {
                error: Some(RequestDeniedError::new("access_denied", "no")),
                ..remembered("denied")
            },
        )
        .await
        .unwrap();
    consent
        .handle_consent_request(
            "expired",
            &HandledConsentRequest {
                remember_for: 60,
                requested_at: Some(now - Duration::minutes(5)),
                ..remembered("expired")
            },
        )
        .await
        .unwrap();
    consent
        .handle_consent_request("skipped", &remembered("skipped"))
        .await
        .unwrap();

    let granted = consent
        .find_previously_granted_consent_requests(Some(CLIENT_ID), "alice", None)
        .await
        .unwrap();
    let mut challenges: Vec<_> = granted.iter().map(|h| h.challenge.as_str()).collect();
    challenges.sort_unstable();
    assert_eq!(challenges, vec!["keep-1", "keep-2"]);
    assert!(granted.iter().all(|h| h.consent_request.is_some()));

    let page = consent
        .find_previously_granted_consent_requests(None, "alice", Some(Pagination::new(1, 1)))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let past_end = consent
        .find_previously_granted_consent_requests(None, "alice", Some(Pagination::new(5, 10)))
        .await
        .unwrap();
    assert!(past_end.is_empty());

    let err = consent
        .find_previously_granted_consent_requests(Some(CLIENT_ID), "bob", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoPreviousConsent));
}

#[tokio::test]
async fn remember_for_beyond_time_range_stays_granted() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));
    consent
        .create_consent_request(&consent_request("forever", "alice"))
        .await
        .unwrap();
    consent
        .handle_consent_request(
            "forever",
            &HandledConsentRequest {
                remember_for: 1_000_000_000_000,
                requested_at: Some(OffsetDateTime::now_utc()),
                ..remembered("forever")
            },
        )
        .await
        .unwrap();

    let granted = consent
        .find_previously_granted_consent_requests(Some(CLIENT_ID), "alice", None)
        .await
        .unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].challenge, "forever");
}

#[tokio::test]
async fn revoke_consent_session_revokes_tokens_per_challenge() {
    let fixture = Fixture::new().await;
    let revoker = Arc::new(RecordingRevoker::default());
    let consent = fixture.consent(revoker.clone());

    for challenge in ["c-1", "c-2"] {
        consent
            .create_consent_request(&consent_request(challenge, "alice"))
            .await
            .unwrap();
        consent
            .handle_consent_request(challenge, &remembered(challenge))
            .await
            .unwrap();
    }
    consent
        .create_consent_request(&consent_request("other", "bob"))
        .await
        .unwrap();

    consent
        .revoke_consent_session("alice", Some(CLIENT_ID))
        .await
        .unwrap();

    let mut access = revoker.access.lock().unwrap().clone();
    access.sort_unstable();
    assert_eq!(access, vec!["c-1", "c-2"]);
    assert_eq!(revoker.refresh.lock().unwrap().len(), 2);

    assert!(consent.get_consent_request("c-1").await.unwrap_err().is_not_found());
    consent.get_consent_request("other").await.unwrap();

    let err = consent
        .revoke_consent_session("alice", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn revoke_consent_session_without_handled_requests_is_not_found() {
    let fixture = Fixture::new().await;
    let revoker = Arc::new(RecordingRevoker::default());
    let consent = fixture.consent(revoker.clone());
    consent
        .create_consent_request(&consent_request("pending", "alice"))
        .await
        .unwrap();

    let err = consent
        .revoke_consent_session("alice", Some(CLIENT_ID))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(revoker.access.lock().unwrap().is_empty());
    assert!(revoker.refresh.lock().unwrap().is_empty());
    consent.get_consent_request("pending").await.unwrap();
}

#[tokio::test]
async fn revoke_consent_session_deletes_issued_tokens() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(fixture.tokens.clone());

    consent
        .create_consent_request(&consent_request("c-1", "alice"))
        .await
        .unwrap();
    consent
        .handle_consent_request("c-1", &remembered("c-1"))
        .await
        .unwrap();

    // Tokens are minted with the consent challenge as request id.
    fixture
        .tokens
        .create_access_token_session("at", &token_request("c-1", "alice"))
        .await
        .unwrap();

    // No refresh token exists; its revocation is tolerated.
    consent.revoke_consent_session("alice", None).await.unwrap();

    let err = fixture
        .tokens
        .find_session::<DefaultSession>(TokenKind::AccessToken, "at")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn authentication_handshake() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));

    consent
        .create_authentication_request(&consent_request("login-1", ""))
        .await
        .unwrap();
    consent.get_authentication_request("login-1").await.unwrap();

    let handled = HandledAuthenticationRequest {
        challenge: "login-1".into(),
        remember: true,
        acr: "1".into(),
        subject: "alice".into(),
        ..HandledAuthenticationRequest::default()
    };
    consent
        .handle_authentication_request("login-1", &handled)
        .await
        .unwrap();

    let redeemed = consent
        .verify_and_invalidate_authentication_request("login-1-verifier")
        .await
        .unwrap();
    assert_eq!(redeemed.subject, "alice");
    assert_eq!(redeemed.acr, "1");
    assert!(redeemed.error.is_none());
    assert!(redeemed.authentication_request.is_some());

    let err = consent
        .verify_and_invalidate_authentication_request("login-1-verifier")
        .await
        .unwrap_err();
    assert!(err.is_already_used());
}

#[tokio::test]
async fn authentication_sessions() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));

    for (id, subject) in [("s-1", "alice"), ("s-2", "alice"), ("s-3", "bob")] {
        consent
            .create_authentication_session(&AuthenticationSession {
                id: id.into(),
                authenticated_at: None,
                subject: subject.into(),
            })
            .await
            .unwrap();
    }

    let session = consent.get_authentication_session("s-1").await.unwrap();
    assert_eq!(session.subject, "alice");
    assert!(session.authenticated_at.is_some());

    consent.revoke_user_authentication_session("alice").await.unwrap();
    assert!(
        consent
            .get_authentication_session("s-2")
            .await
            .unwrap_err()
            .is_not_found()
    );
    consent.get_authentication_session("s-3").await.unwrap();

    let err = consent
        .revoke_user_authentication_session("alice")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    consent.delete_authentication_session("s-3").await.unwrap();
    consent.delete_authentication_session("s-3").await.unwrap();
}

#[tokio::test]
async fn forced_obfuscated_session_is_upserted() {
    let fixture = Fixture::new().await;
    let consent = fixture.consent(Arc::new(RecordingRevoker::default()));

    let mut session = ForcedObfuscatedAuthenticationSession {
        client_id: CLIENT_ID.into(),
        subject: "alice".into(),
        subject_obfuscated: "pairwise-1".into(),
    };
    consent
        .create_forced_obfuscated_authentication_session(&session)
        .await
        .unwrap();

    session.subject_obfuscated = "pairwise-2".into();
    consent
        .create_forced_obfuscated_authentication_session(&session)
        .await
        .unwrap();

    let found = consent
        .get_forced_obfuscated_authentication_session(CLIENT_ID, "pairwise-2")
        .await
        .unwrap();
    assert_eq!(found, session);

    let err = consent
        .get_forced_obfuscated_authentication_session(CLIENT_ID, "pairwise-1")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
