//! System controller: liveness

pub struct SystemController;

impl SystemController {
    /// Plain `ok`, no auth, no side effects.
    pub async fn healthz() -> &'static str {
        "ok"
    }
}
