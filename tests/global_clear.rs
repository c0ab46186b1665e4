use arbor_di::{Injector, LookupOptions, Provider, RegistrationOptions, Token};

#[test]
fn it_clears_global_registrations() {
    let token = Token::symbol("feature flag");
    Injector::register_global(token.clone(), Provider::value(true), RegistrationOptions::new()).unwrap();

    let promoted = Injector::new("promoted");
    assert!(*promoted.resolve_token::<bool>(token.clone()).unwrap());

    Injector::clear_global_registrations();

    assert!(!Injector::has_global_registration(&token));
    assert!(!Injector::new("fresh").has_registration(&token, LookupOptions::new()));
    assert!(*promoted.resolve_token::<bool>(token).unwrap());
}
