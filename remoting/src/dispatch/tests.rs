// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Tests for dispatchers

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::*;
use crate::common_test::{Alice, Greeter, Person, TestGreeter};
use crate::{
    ArgumentWriter, BuildErr, DispatchErr, IdScheme, InterfaceDescription, InterfaceType,
};

fn greeter_description() -> Arc<InterfaceDescription> {
    Arc::new(
        InterfaceDescription::describe(InterfaceType::of::<dyn Greeter>(), IdScheme::ContentHash)
            .expect("Failed to describe Greeter"),
    )
}

fn greeter_dispatcher() -> MethodDispatcher<TestGreeter> {
    let binder = InvokerBinder::<TestGreeter>::of::<dyn Greeter>();
    MethodDispatcher::build(greeter_description(), &binder).expect("Failed to build dispatcher")
}

fn string_arg(value: &str) -> Vec<u8> {
    let mut args = ArgumentWriter::new();
    args.push(value.to_string());
    args.into_bytes()
}

#[tokio::test]
async fn test_dispatch_invokes_bound_method() {
    let dispatcher = greeter_dispatcher();
    let target = Arc::new(TestGreeter::default());
    let greet = dispatcher.description().method_at(0).unwrap().id;

    let result = dispatcher
        .dispatch(
            target.clone(),
            greet,
            string_arg("world"),
            CancellationToken::new(),
        )
        .await
        .expect("Dispatch failed");

    assert_eq!("Hello world", String::from_bytes(result).unwrap());
    assert_eq!(1, target.greetings.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unknown_method_never_invokes() {
    let dispatcher = greeter_dispatcher();
    let target = Arc::new(TestGreeter::default());
    let unknown = dispatcher
        .description()
        .methods
        .iter()
        .map(|m| m.id)
        .max()
        .unwrap()
        .wrapping_add(1);

    let err = dispatcher
        .dispatch(
            target.clone(),
            unknown,
            string_arg("world"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchErr::UnknownMethod { method_id, .. } if method_id == unknown
    ));
    assert_eq!(0, target.greetings.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_user_errors_are_captured_as_remote_failures() {
    let dispatcher = greeter_dispatcher();
    let fail = dispatcher.description().method_at(1).unwrap().id;

    let err = dispatcher
        .dispatch(
            Arc::new(TestGreeter::default()),
            fail,
            string_arg("disk full"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        DispatchErr::Failed(failure) => {
            assert_eq!("Greeter", failure.interface);
            assert_eq!("fail", failure.method);
            assert_eq!("disk full", failure.message);
        }
        other => panic!("Unexpected dispatch result {other:?}"),
    }
}

#[tokio::test]
async fn test_panics_are_captured_as_remote_failures() {
    let dispatcher = greeter_dispatcher();
    let explode = dispatcher.description().method_at(3).unwrap().id;

    let err = dispatcher
        .dispatch(
            Arc::new(TestGreeter::default()),
            explode,
            vec![],
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        DispatchErr::Failed(failure) => assert!(failure.message.contains("Boom!")),
        other => panic!("Unexpected dispatch result {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_arguments_fail_to_decode() {
    let dispatcher = greeter_dispatcher();
    let greet = dispatcher.description().method_at(0).unwrap().id;

    let err = dispatcher
        .dispatch(
            Arc::new(TestGreeter::default()),
            greet,
            vec![0, 0, 1],
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchErr::Decode(_)));
}

#[tokio::test]
async fn test_cancelled_calls_never_run() {
    let dispatcher = greeter_dispatcher();
    let target = Arc::new(TestGreeter::default());
    let greet = dispatcher.description().method_at(0).unwrap().id;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = dispatcher
        .dispatch(target.clone(), greet, string_arg("world"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchErr::Cancelled));
    assert_eq!(0, target.greetings.load(Ordering::SeqCst));
}

#[test]
fn test_missing_invoker_fails_build() {
    let binder = InvokerBinder::<TestGreeter>::new();
    let err = MethodDispatcher::build(greeter_description(), &binder)
        .err()
        .expect("Build should fail without invokers");
    assert_eq!(
        BuildErr::MissingInvoker {
            interface: "Greeter".to_string(),
            method: "greet".to_string(),
        },
        err
    );
}

#[test]
fn test_dispatcher_set_rejects_duplicate_interface_ids() {
    let binder = InvokerBinder::<TestGreeter>::of::<dyn Greeter>();
    let err = DispatcherSet::build(&[greeter_description(), greeter_description()], &binder)
        .err()
        .expect("A repeated interface id must fail the build");
    assert!(matches!(
        err,
        BuildErr::InterfaceIdCollision { ref existing, ref incoming, .. }
            if existing == "Greeter" && incoming == "Greeter"
    ));
}

#[tokio::test]
async fn test_dispatcher_set_routes_each_interface() {
    let descriptions = InterfaceDescription::describe_hierarchy(
        InterfaceType::of::<dyn Person>(),
        IdScheme::ContentHash,
    )
    .unwrap();
    let binder = InvokerBinder::<Alice>::of::<dyn Person>();
    assert_eq!(3, binder.len());
    let set = DispatcherSet::build(&descriptions, &binder).expect("Failed to build set");
    assert_eq!(descriptions[0].id, set.primary_id());

    let target = Arc::new(Alice);
    let named = &descriptions[1];
    let name = set
        .dispatch(
            target.clone(),
            named.id,
            named.methods[0].id,
            vec![],
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!("Alice", String::from_bytes(name).unwrap());

    let aged = &descriptions[2];
    let age = set
        .dispatch(
            target.clone(),
            aged.id,
            aged.methods[0].id,
            vec![],
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(31, u32::from_bytes(age).unwrap());

    // a method id of one interface isn't routable through another
    let err = set
        .dispatch(
            target.clone(),
            aged.id,
            named.methods[0].id,
            vec![],
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchErr::UnknownMethod { .. }));

    let err = set
        .dispatch(target, 0xdead_beef, 0, vec![], CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchErr::UnknownInterface(0xdead_beef)));
}

#[test]
fn test_prepare_resolves_without_running() {
    let dispatcher = greeter_dispatcher();
    let count = dispatcher.description().method_at(2).unwrap().id;
    let call = dispatcher.prepare(count, vec![]).expect("Failed to prepare");
    assert_eq!("Greeter", call.interface_name());
    assert_eq!("count", call.method().name);
}
