use super::gateway::{GatewayError, LlmGateway};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted gateway outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(GatewayError),
    /// Sleep before answering, to exercise caller-side timeouts
    Delayed(Duration, String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        MockReply::Text(content.into())
    }

    pub fn timeout() -> Self {
        MockReply::Error(GatewayError::Timeout { seconds: 1 })
    }
}

/// Error returned once every queue for a prompt is empty
pub fn exhausted() -> GatewayError {
    GatewayError::InvalidResponse("no scripted responses left".to_string())
}

/// Scripted gateway for tests.
///
/// Replies are routed by the first prompt line that contains a registered key,
/// so concurrently running stages each get their own queue. Prompts that match
/// no key draw from the default queue.
pub struct MockGateway {
    routes: Mutex<Vec<(String, VecDeque<MockReply>)>>,
    default: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            default: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a reply for prompts that do not match any key
    pub fn push(&self, reply: MockReply) -> &Self {
        self.default.lock().unwrap().push_back(reply);
        self
    }

    /// Queue a reply for prompts containing `key`
    pub fn push_for(&self, key: impl Into<String>, reply: MockReply) -> &Self {
        let key = key.into();
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, queue)) => queue.push_back(reply),
            None => routes.push((key, VecDeque::from([reply]))),
        }
        self
    }

    /// Total number of `generate` calls
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Number of calls routed to `key`
    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self, prompt: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap();
        if let Some((key, queue)) = routes.iter_mut().find(|(k, _)| prompt.contains(k.as_str())) {
            *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
            return queue.pop_front();
        }
        drop(routes);
        self.default.lock().unwrap().pop_front()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn generate(&self, _model: &str, prompt: &str) -> Result<String, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        match self.next_reply(prompt) {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Error(err)) => Err(err),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(exhausted()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGateway")
            .field("calls", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_queue_in_order() {
        let gateway = MockGateway::new();
        gateway.push(MockReply::text("first")).push(MockReply::text("second"));

        assert_eq!(gateway.generate("m", "a").await.unwrap(), "first");
        assert_eq!(gateway.generate("m", "b").await.unwrap(), "second");
        assert_eq!(gateway.generate("m", "c").await, Err(exhausted()));
        assert!(!exhausted().is_retryable());
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test]
    async fn test_routed_replies() {
        let gateway = MockGateway::new();
        gateway
            .push_for("visual.spec.ts", MockReply::timeout())
            .push_for("flow.spec.ts", MockReply::text("flow body"));

        assert_eq!(
            gateway.generate("m", "write flow.spec.ts").await.unwrap(),
            "flow body"
        );
        assert!(gateway.generate("m", "write visual.spec.ts").await.is_err());
        assert_eq!(gateway.calls_for("visual.spec.ts"), 1);
        assert_eq!(gateway.calls_for("flow.spec.ts"), 1);
    }

    #[tokio::test]
    async fn test_prompts_recorded() {
        let gateway = MockGateway::new();
        gateway.push(MockReply::text("ok"));
        gateway.generate("m", "hello").await.unwrap();
        assert_eq!(gateway.prompts(), vec!["hello".to_string()]);
    }
}
