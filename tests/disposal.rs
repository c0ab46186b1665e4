use arbor_di::{
    AsyncDispose, BoxError, Dispose, ErrorKind, Injector, Instance, Provider,
    RegistrationOptions, ResolveOptions, Token
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering}
};

struct Pool {
    disposed: Arc<AtomicUsize>,
}

impl Dispose for Pool {
    fn dispose(&self) -> Result<(), BoxError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn pool_provider(disposed: &Arc<AtomicUsize>) -> Provider {
    let disposed = disposed.clone();
    Provider::factory_instance(move |_, _| Ok(Instance::disposable(Pool { disposed: disposed.clone() })))
}

#[tokio::test]
async fn it_disposes_children_with_their_parent() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let parent = Injector::new("parent");
    parent.register(Token::of::<Pool>(), pool_provider(&disposed), RegistrationOptions::new()).unwrap();

    let child = parent.fork("child");
    let pool = child.resolve::<Pool>().unwrap();
    drop(pool);

    parent.dispose().await.unwrap();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(child.is_disposed());
    assert!(child.cancellation_token().is_cancelled());

    parent.dispose().await.unwrap();
    child.dispose().await.unwrap();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_disposes_children_whose_handle_was_dropped() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let parent = Injector::new("parent");
    parent.register(Token::of::<Pool>(), pool_provider(&disposed), RegistrationOptions::new()).unwrap();

    let pool = {
        let child = parent.fork("child");
        child.resolve::<Pool>().unwrap()
    };

    parent.dispose().await.unwrap();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(Arc::strong_count(&pool), 1);
}

#[tokio::test]
async fn it_disposes_a_child_on_its_own() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let parent = Injector::new("parent");
    parent.register(Token::of::<Pool>(), pool_provider(&disposed), RegistrationOptions::new()).unwrap();

    let child = parent.fork("child");
    child.resolve::<Pool>().unwrap();
    child.dispose().await.unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(!parent.is_disposed());

    parent.dispose().await.unwrap();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_disposes_a_value_once() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let injector = Injector::new("root");
    injector.register_singleton(Token::of::<Pool>(), pool_provider(&disposed), RegistrationOptions::new()).unwrap();

    injector.resolve::<Pool>().unwrap();
    injector.resolve::<Pool>().unwrap();
    injector.fork("child").resolve::<Pool>().unwrap();

    injector.dispose().await.unwrap();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn it_rejects_resolves_after_disposal() {
    let injector = Injector::new("root");
    injector.register("answer", Provider::value(42u8), RegistrationOptions::new()).unwrap();

    injector.dispose().await.unwrap();

    let err = injector.resolve_with("answer", None, ResolveOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disposed);
    assert!(!injector.has_own_registration(&Token::named("answer")));
}

struct Socket {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl AsyncDispose for Socket {
    async fn dispose(&self) -> Result<(), BoxError> {
        tokio::task::yield_now().await;
        self.log.lock().unwrap().push("socket");
        Ok(())
    }
}

#[tokio::test]
async fn it_runs_dispose_handlers_in_reverse_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let injector = Injector::new("root");

    let socket_log = log.clone();
    injector.register(
        Token::of::<Socket>(),
        Provider::factory_instance(move |_, ctx| {
            let handler_log = socket_log.clone();
            ctx.add_dispose_handler(move || {
                handler_log.lock().unwrap().push("handler");
                Ok(())
            });
            Ok(Instance::async_disposable(Socket { log: socket_log.clone() }))
        }),
        RegistrationOptions::new()).unwrap();

    let async_log = log.clone();
    injector.register(
        "flush",
        Provider::factory(move |_, ctx| {
            let async_log = async_log.clone();
            ctx.add_async_dispose_handler(move || async move {
                async_log.lock().unwrap().push("flush");
                Ok::<_, BoxError>(())
            });
            Ok::<_, arbor_di::Error>(())
        }),
        RegistrationOptions::new()).unwrap();

    injector.resolve::<Socket>().unwrap();
    injector.resolve_with("flush", None, ResolveOptions::new()).unwrap();
    injector.dispose().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["flush", "socket", "handler"]);
}

struct Faulty;

impl Dispose for Faulty {
    fn dispose(&self) -> Result<(), BoxError> {
        Err("faulty".into())
    }
}

#[tokio::test]
async fn it_keeps_disposing_after_a_failure() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let injector = Injector::new("root");
    injector.register(Token::of::<Pool>(), pool_provider(&disposed), RegistrationOptions::new()).unwrap();
    injector.register(
        Token::of::<Faulty>(),
        Provider::factory_instance(|_, _| Ok(Instance::disposable(Faulty))),
        RegistrationOptions::new()).unwrap();

    injector.resolve::<Pool>().unwrap();
    injector.resolve::<Faulty>().unwrap();

    let err = injector.dispose().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DisposeFailed);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(injector.dispose().await.is_ok());
}

#[tokio::test]
async fn it_exposes_cancellation_to_factories() {
    let injector = Injector::new("root");
    injector.register(
        "watcher",
        Provider::factory(|_, ctx| Ok::<_, arbor_di::Error>(ctx.cancellation_token().clone())),
        RegistrationOptions::new()).unwrap();

    let child = injector.fork("child");
    let token = child
        .resolve_token::<tokio_util::sync::CancellationToken>("watcher")
        .unwrap();

    assert!(!token.is_cancelled());
    injector.dispose().await.unwrap();
    assert!(token.is_cancelled());
}
