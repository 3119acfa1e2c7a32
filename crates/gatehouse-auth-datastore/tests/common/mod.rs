//! Shared fixtures for the datastore integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_auth::{
    Argon2Hasher, AuthResult, Client, ClientStorage, ConsentRequest, DefaultSession, Request,
    TokenRevoker,
};
use gatehouse_auth_datastore::{
    DatastoreClientManager, DatastoreConnection, DatastoreConsentManager, DatastoreTokenStore,
};

pub const CLIENT_ID: &str = "app";
pub const CLIENT_SECRET: &str = "s3cr3t";

/// A connection with one registered client and the managers built on it.
pub struct Fixture {
    pub connection: DatastoreConnection,
    pub clients: Arc<DatastoreClientManager>,
    pub tokens: Arc<DatastoreTokenStore>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_lifespan(Duration::from_secs(3600)).await
    }

    pub async fn with_lifespan(lifespan: Duration) -> Self {
        let connection = DatastoreConnection::in_memory("test");
        let clients = Arc::new(connection.new_client_manager(Arc::new(Argon2Hasher)));

        let client = Client {
            secret: CLIENT_SECRET.to_string(),
            scope: "openid offline".to_string(),
            ..Client::new(CLIENT_ID)
        };
        clients.create_client(&client).await.unwrap();

        let tokens = Arc::new(connection.new_oauth2_manager(clients.clone(), lifespan));
        Self {
            connection,
            clients,
            tokens,
        }
    }

    /// A consent manager reporting revocations to `revoker`.
    pub fn consent(&self, revoker: Arc<dyn TokenRevoker>) -> DatastoreConsentManager {
        self.connection
            .new_consent_manager(self.clients.clone(), revoker)
    }
}

/// Records every revocation call.
#[derive(Default)]
pub struct RecordingRevoker {
    pub access: Mutex<Vec<String>>,
    pub refresh: Mutex<Vec<String>>,
}

#[async_trait]
impl TokenRevoker for RecordingRevoker {
    async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()> {
        self.access.lock().unwrap().push(request_id.to_string());
        Ok(())
    }

    async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()> {
        self.refresh.lock().unwrap().push(request_id.to_string());
        Ok(())
    }
}

pub fn token_request(id: &str, subject: &str) -> Request<DefaultSession> {
    let mut request = Request::new(id, Client::new(CLIENT_ID), DefaultSession::new(subject));
    request.requested_scopes = vec!["openid".into(), "offline".into()];
    request.granted_scopes = vec!["openid".into()];
    request
        .form
        .push(("redirect_uri".into(), "https://app.example/cb".into()));
    request
}

pub fn consent_request(challenge: &str, subject: &str) -> ConsentRequest {
    ConsentRequest {
        challenge: challenge.to_string(),
        verifier: format!("{challenge}-verifier"),
        client: Client::new(CLIENT_ID),
        subject: subject.to_string(),
        request_url: "https://auth.example/oauth2/auth?client_id=app".to_string(),
        requested_scope: vec!["openid".into(), "offline".into()],
        csrf: format!("{challenge}-csrf"),
        ..ConsentRequest::default()
    }
}
