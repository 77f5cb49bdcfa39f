use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{MailError, Mailer, OutboundEmail};

/// SendGrid v3 `mail/send` client guarded by a circuit breaker.
#[derive(Clone)]
pub struct SendGridMailer {
    client: Client,
    base_url: String,
    api_key: String,
    sender: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl SendGridMailer {
    pub fn new(base_url: String, api_key: String, sender: String) -> Self {
        Self::with_circuit_breaker(base_url, api_key, sender, 5, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        api_key: String,
        sender: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            api_key,
            sender,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn payload(&self, email: &OutboundEmail) -> serde_json::Value {
        json!({
            "personalizations": [{
                "to": [{ "email": email.to }],
                "dynamic_template_data": email.dynamic_fields,
            }],
            "from": { "email": self.sender },
            "template_id": email.template_id,
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let payload = self.payload(email);

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MailError::Rejected {
                        status: status.as_u16(),
                        body,
                    });
                }

                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(FailsafeError::Rejected) => Err(MailError::CircuitBreakerOpen(
                "SendGrid circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "alice@example.com".to_string(),
            template_id: "transfer-otp".to_string(),
            dynamic_fields: json!({"firstName": "Alice", "otp": "123456"}),
        }
    }

    #[tokio::test]
    async fn posts_template_payload_with_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mail/send")
            .match_header("authorization", "Bearer sg-key")
            .match_body(Matcher::PartialJson(json!({
                "personalizations": [{
                    "to": [{"email": "alice@example.com"}],
                    "dynamic_template_data": {"firstName": "Alice", "otp": "123456"}
                }],
                "from": {"email": "no-reply@example.com"},
                "template_id": "transfer-otp"
            })))
            .with_status(202)
            .create_async()
            .await;

        let mailer = SendGridMailer::new(
            server.url(),
            "sg-key".to_string(),
            "no-reply@example.com".to_string(),
        );
        mailer.send(&email()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v3/mail/send")
            .with_status(400)
            .with_body("bad template")
            .create_async()
            .await;

        let mailer = SendGridMailer::new(
            server.url(),
            "sg-key".to_string(),
            "no-reply@example.com".to_string(),
        );
        let err = mailer.send(&email()).await.unwrap_err();
        assert!(matches!(err, MailError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn breaker_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v3/mail/send")
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let mailer = SendGridMailer::with_circuit_breaker(
            server.url(),
            "sg-key".to_string(),
            "no-reply@example.com".to_string(),
            2,
            60,
        );
        assert_eq!(mailer.circuit_state(), "closed");

        for _ in 0..2 {
            let _ = mailer.send(&email()).await;
        }

        assert_eq!(mailer.circuit_state(), "open");
        let err = mailer.send(&email()).await.unwrap_err();
        assert!(matches!(err, MailError::CircuitBreakerOpen(_)));
    }
}
