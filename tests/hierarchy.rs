use arbor_di::{
    Arguments, ErrorKind, Injector, Instance, Parameter, Provider, RegistrationOptions,
    ResolveOptions, Token, TokenProvider, TypeInfo, argument
};
use std::sync::Arc;

#[test]
fn it_resolves_from_the_nearest_injector() {
    let root = Injector::new("root");
    let child = root.fork("child");
    root.register("env", Provider::value("root"), RegistrationOptions::new()).unwrap();
    child.register("env", Provider::value("child"), RegistrationOptions::new()).unwrap();

    assert_eq!(*child.resolve_token::<&str>("env").unwrap(), "child");
    assert_eq!(*root.resolve_token::<&str>("env").unwrap(), "root");

    let from_parent = child.resolve_with("env", None, ResolveOptions::new().skip_self()).unwrap().unwrap();
    assert_eq!(*from_parent.downcast_ref::<&str>().unwrap(), "root");
}

#[test]
fn it_honors_only_self() {
    let root = Injector::new("root");
    let child = root.fork("child");
    root.register("env", Provider::value("root"), RegistrationOptions::new()).unwrap();

    let err = child.resolve_with("env", None, ResolveOptions::new().only_self()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoProvider);

    let missing = child.resolve_with("env", None, ResolveOptions::new().only_self().optional()).unwrap();
    assert!(missing.is_none());

    let missing = child.resolve_with("env", None, ResolveOptions::new().skip_self().only_self().optional()).unwrap();
    assert!(missing.is_none());
}

#[test]
fn it_fails_skip_self_on_a_root() {
    let root = Injector::new("root");
    root.register("env", Provider::value("root"), RegistrationOptions::new()).unwrap();

    let err = root.resolve_with("env", None, ResolveOptions::new().skip_self()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoProvider);
}

#[test]
fn it_resolves_multi_tokens_in_registration_order() {
    let injector = Injector::new("root");
    injector.register("plugins", vec![Provider::value("auth"), Provider::value("cors")], RegistrationOptions::new()).unwrap();
    injector.register("plugins", Provider::value("gzip"), RegistrationOptions::new().multi()).unwrap();

    let all = injector.resolve_all_with("plugins", None, ResolveOptions::new()).unwrap();
    let names = all.iter().map(|p| *p.downcast_ref::<&str>().unwrap()).collect::<Vec<_>>();
    assert_eq!(names, vec!["auth", "cors", "gzip"]);

    assert_eq!(*injector.resolve_token::<&str>("plugins").unwrap(), "gzip");
}

#[test]
fn it_replaces_single_registrations() {
    let injector = Injector::new("root");
    injector.register("port", Provider::value(80u16), RegistrationOptions::new()).unwrap();
    injector.register("port", Provider::value(8080u16), RegistrationOptions::new()).unwrap();

    assert_eq!(*injector.resolve_token::<u16>("port").unwrap(), 8080);
    assert_eq!(injector.resolve_all_with("port", None, ResolveOptions::new()).unwrap().len(), 1);
}

struct Handler(&'static str);

#[test]
fn it_resolves_aliases() {
    let injector = Injector::new("root");
    injector.register(Token::of::<Handler>(), Provider::value(Handler("primary")), RegistrationOptions::new()).unwrap();
    injector.register("handler", Provider::alias(Token::of::<Handler>()), RegistrationOptions::new()).unwrap();
    injector.register("handlers", vec![Provider::value(Handler("a")), Provider::value(Handler("b"))], RegistrationOptions::new()).unwrap();
    injector.register("every-handler", Provider::alias_all("handlers"), RegistrationOptions::new()).unwrap();

    let primary = injector.resolve::<Handler>().unwrap();
    let aliased = injector.resolve_token::<Handler>("handler").unwrap();
    assert!(Arc::ptr_eq(&primary, &aliased));

    let every = injector.resolve_with("every-handler", None, ResolveOptions::new()).unwrap().unwrap();
    let names = every
        .downcast_all::<Handler>()
        .unwrap()
        .iter()
        .map(|h| h.0)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn it_maps_alias_arguments() {
    let injector = Injector::new("root");
    injector.register(
        "double",
        Provider::factory(|arg, _| Ok::<_, arbor_di::Error>(arg
            .and_then(|arg| arg.downcast::<u32>().ok())
            .map(|n| *n * 2)
            .unwrap_or_default())),
        RegistrationOptions::new()).unwrap();
    injector.register(
        "double-of-ten",
        TokenProvider::new("double").map_argument(|_| Some(argument(10u32))),
        RegistrationOptions::new()).unwrap();

    let value = injector.resolve_with("double-of-ten", None, ResolveOptions::new()).unwrap().unwrap();
    assert_eq!(value.downcast_ref::<u32>(), Some(&20));

    let value = injector.resolve_with("double", Some(argument(4u32)), ResolveOptions::new()).unwrap().unwrap();
    assert_eq!(value.downcast_ref::<u32>(), Some(&8));
}

struct Router {
    routes: Vec<Arc<&'static str>>,
    prefix: Option<Arc<String>>,
    fallback: Option<Arc<&'static str>>,
}

#[test]
fn it_constructs_with_lists_arguments_and_optional_parameters() {
    TypeInfo::builder::<Router>()
        .parameter(Parameter::token("routes").all())
        .parameter(Parameter::resolve_argument())
        .parameter(Parameter::token("fallback").optional())
        .register(|args: Arguments| Ok(Router {
            routes: args.all(0)?,
            prefix: args.argument(1)?,
            fallback: args.optional(2)?
        }));

    let injector = Injector::new("root");
    injector.register("routes", vec![Provider::value("/"), Provider::value("/health")], RegistrationOptions::new()).unwrap();
    injector.register(Token::of::<Router>(), Provider::class::<Router>(), RegistrationOptions::new()).unwrap();

    let router = injector.resolve_argument::<Router>(argument(String::from("/api"))).unwrap();

    assert_eq!(router.routes.iter().map(|r| **r).collect::<Vec<_>>(), vec!["/", "/health"]);
    assert_eq!(router.prefix.as_deref().map(String::as_str), Some("/api"));
    assert!(router.fallback.is_none());
}

#[test]
fn it_resolves_raw_instances() {
    let injector = Injector::new("root");
    let shared = Instance::new(5u8);
    injector.register("shared", Provider::instance(shared.clone()), RegistrationOptions::new()).unwrap();

    let resolved = injector.resolve_with("shared", None, ResolveOptions::new()).unwrap().unwrap();

    assert!(Instance::ptr_eq(&shared, &resolved));
}
