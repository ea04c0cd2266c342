// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Different test scenarios are defined here

use clap::Parser;

pub mod reentrant_chain;

#[derive(Parser, Debug, Clone)]
pub enum TestCase {
    /// Call a counter hosted by a peer process, over either transport
    CrossProcess(cross_process::CrossProcessConfig),
    /// Bounce a call chain between two hosts over TCP, re-entering the busy hosts
    ReentrantChain(reentrant_chain::ReentrantChainConfig),
    /// Not-a-Node: Don't run any test and exit this node with code 0
    Nan,
}

/// Run a test case, returning the process's exit code
pub(crate) async fn run(case: TestCase) -> i32 {
    match case {
        TestCase::CrossProcess(config) => cross_process::test(config).await,
        TestCase::ReentrantChain(config) => reentrant_chain::test(config).await,
        TestCase::Nan => 0,
    }
}
