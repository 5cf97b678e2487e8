pub mod claude;
pub mod http;
pub mod traits;

pub use claude::{ClaudeProvider, FetchError, NotifyError, ResolutionError};
pub use traits::*;

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport with scripted responses

    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::Value;
    use tokio::sync::Semaphore;

    use super::traits::*;
    use crate::storage::Credentials;

    #[derive(Debug, Clone)]
    pub struct Call {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
        pub timeout: Duration,
    }

    type Reply = Result<HttpResponse, NetworkError>;

    /// Replies are queued per `METHOD path`; the last queued reply repeats.
    /// Unscripted routes answer 404.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<Call>>,
        gate: Mutex<Option<(String, Arc<Semaphore>)>>,
        /// Per path: requests currently awaiting a reply, and the peak
        in_flight: Mutex<HashMap<String, (usize, usize)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, method: &str, path: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .entry(format!("{} {}", method, path))
                .or_default()
                .push_back(reply);
        }

        /// Hold requests to `path` until the returned semaphore gets permits
        pub fn gate(&self, path: &str) -> Arc<Semaphore> {
            let semaphore = Arc::new(Semaphore::new(0));
            *self.gate.lock().unwrap() = Some((path.to_string(), semaphore.clone()));
            semaphore
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, method: &str, path: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.method.as_str() == method && c.path == path)
                .count()
        }

        /// Most requests to `path` that were ever outstanding at once
        pub fn max_in_flight(&self, path: &str) -> usize {
            self.in_flight
                .lock()
                .unwrap()
                .get(path)
                .map_or(0, |(_, peak)| *peak)
        }

        fn next_reply(&self, key: &str) -> Reply {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Ok(HttpResponse::new(404, "not found")),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            body: Option<&Value>,
            timeout: Duration,
        ) -> Result<HttpResponse, NetworkError> {
            self.calls.lock().unwrap().push(Call {
                method: method.clone(),
                path: path.to_string(),
                body: body.cloned(),
                timeout,
            });

            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let (now, peak) = in_flight.entry(path.to_string()).or_default();
                *now += 1;
                *peak = (*peak).max(*now);
            }

            let gate = self
                .gate
                .lock()
                .unwrap()
                .as_ref()
                .filter(|(gated, _)| gated == path)
                .map(|(_, semaphore)| semaphore.clone());
            if let Some(semaphore) = gate {
                if let Ok(permit) = semaphore.acquire().await {
                    permit.forget();
                }
            }

            if let Some((now, _)) = self.in_flight.lock().unwrap().get_mut(path) {
                *now -= 1;
            }
            self.next_reply(&format!("{} {}", method, path))
        }
    }

    /// Connector handing out one shared scripted transport
    pub struct ScriptedConnector(pub Arc<ScriptedTransport>);

    impl Connector for ScriptedConnector {
        fn connect(
            &self,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn HttpTransport>, NetworkError> {
            Ok(self.0.clone())
        }
    }
}
