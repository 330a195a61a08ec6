// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

fn main() {
    // The execl family is C-variadic and cannot be expressed as a stable
    // Rust extern definition. A small C shim packs the argument list into
    // an argv array and calls back into the exported Rust entry points.
    cc::Build::new()
        .file("src/varargs.c")
        .flag_if_supported("-fvisibility=default")
        .compile("wisk_varargs");
    println!("cargo:rerun-if-changed=src/varargs.c");
}
