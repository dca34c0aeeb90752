/// Runs a closure when the guard goes out of scope, including while a
/// panic unwinds through the owning future.
pub struct ScopeGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(on_exit: F) -> Self {
        Self(Some(on_exit))
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.0.take() {
            on_exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn aborts_writer_when_owner_panics() {
        let writer = tokio::spawn(std::future::pending::<()>());
        let abort = writer.abort_handle();

        let owner = tokio::spawn(async move {
            let _stop_writer = ScopeGuard::new(move || abort.abort());
            tokio::time::sleep(Duration::from_millis(1)).await;
            panic!("socket task failed");
        });
        assert!(owner.await.unwrap_err().is_panic());
        assert!(writer.await.unwrap_err().is_cancelled());
    }
}
