#![allow(missing_docs)]

use arbor_di::{Arguments, Injector, Lifecycle, Parameter, Provider, RegistrationOptions, Token, TypeInfo};

use std::hint::black_box;
use std::sync::Arc;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn benchmark(c: &mut Criterion) {
    TypeInfo::builder::<Service>()
        .parameter(Parameter::of::<Counter>())
        .parameter(Parameter::of::<Cache>())
        .parameter(Parameter::of::<Transient>())
        .register(|args: Arguments| Ok(Service {
            _counter: args.get(0)?,
            _cache: args.get(1)?,
            _transient: args.get(2)?
        }));

    let root = Injector::new("root");
    root.register_singleton(Token::of::<Counter>(), Provider::class_default::<Counter>(), RegistrationOptions::new()).unwrap();
    root.register(
        Token::of::<Cache>(),
        Provider::class_default::<Cache>(),
        RegistrationOptions::new().lifecycle(Lifecycle::Injector)).unwrap();
    root.register(Token::of::<Transient>(), Provider::class_default::<Transient>(), RegistrationOptions::new()).unwrap();
    root.register(Token::of::<Service>(), Provider::class::<Service>(), RegistrationOptions::new()).unwrap();

    c.bench_function("singleton", |b| b.iter(
        || root.resolve::<Counter>().unwrap()
    ));
    c.bench_function("injector", |b| b.iter(
        || root.resolve::<Cache>().unwrap()
    ));
    c.bench_function("transient", |b| b.iter(
        || root.resolve::<Transient>().unwrap()
    ));
    c.bench_function("graph", |b| b.iter(
        || root.resolve::<Service>().unwrap()
    ));
    c.bench_function("fork", |b| b.iter(
        || root.fork(black_box("request")).resolve::<Service>().unwrap()
    ));

    let rt = Runtime::new().unwrap();
    c.bench_function("graph_async", |b| b.to_async(&rt).iter(
        || async { root.resolve_async::<Service>().await.unwrap() }
    ));
}

criterion_group!(benches, benchmark);
criterion_main!(benches);

#[derive(Default)]
struct Counter;

#[derive(Default)]
struct Cache;

#[derive(Default)]
struct Transient;

struct Service {
    _counter: Arc<Counter>,
    _cache: Arc<Cache>,
    _transient: Arc<Transient>,
}
