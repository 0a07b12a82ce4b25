// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Nothing to generate: the build-dependency on mavlink-bindgen only switches
// on extension fields for the mavlink dialect build.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
