#![allow(dead_code)]

pub mod handlers {
    use anyhow::Result;
    use handlerbridge::context::RequestContext;
    use handlerbridge::handler::{
        CallbackHandler, Completion, Handler, PendingCall, SyncHandler, TaskHandler,
    };
    use handlerbridge::metadata::HandlerFactory;
    use std::sync::Arc;

    /// Synchronous handler writing the canonical greeting.
    pub struct HelloSync;

    impl SyncHandler for HelloSync {
        fn process(&self, ctx: &Arc<RequestContext>) -> Result<()> {
            ctx.response().write_str("Hello world!")
        }
    }

    /// Callback-async handler: writes during `begin`, signals done
    /// immediately, finishes in `end`.
    pub struct HelloCallback;

    impl CallbackHandler for HelloCallback {
        fn begin(
            &self,
            ctx: &Arc<RequestContext>,
            done: Box<dyn FnOnce() + Send>,
        ) -> Result<PendingCall> {
            ctx.response().write_str("Hello world!")?;
            done();
            Ok(Box::new(()))
        }

        fn end(&self, _pending: PendingCall) -> Result<()> {
            Ok(())
        }
    }

    /// Task-async handler resolving an already-ready completion.
    pub struct HelloTask;

    impl TaskHandler for HelloTask {
        fn process(&self, ctx: &Arc<RequestContext>) -> Result<Completion> {
            ctx.response().write_str("Hello world!")?;
            Ok(Completion::ready(Ok(())))
        }
    }

    /// Factory producing a fresh [`HelloSync`] per request.
    pub fn hello_factory() -> HandlerFactory {
        Arc::new(|_ctx| Ok(Handler::sync(HelloSync)))
    }
}

pub mod temp_files {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Creates a temporary file with a unique name so parallel tests never
    /// collide.
    pub fn create_temp_file(content: &str, ext: &str) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "handlerbridge_test_{}_{}_{}.{}",
            std::process::id(),
            counter,
            nanos,
            ext
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn create_temp_yaml(content: &str) -> PathBuf {
        create_temp_file(content, "yaml")
    }

    /// Cleanup temporary files (best effort).
    pub fn cleanup_temp_files(paths: &[PathBuf]) {
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }
}
