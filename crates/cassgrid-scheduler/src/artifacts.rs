//! Launch-artifact URL construction and OS detection.
//!
//! Executors fetch three artifacts before starting: the JRE archive
//! (OS-qualified), the database distribution archive (version-qualified),
//! and the executor bundle. URLs are built by joining the framework's
//! HTTP base URL with the resource name.

use std::env;

/// Join a base URL and a resource name, collapsing runs of slashes that
/// are not immediately preceded by `:`.
///
/// `http://host:8080//resources/` + `/executor.jar` becomes
/// `http://host:8080/resources/executor.jar`; the scheme's `//` survives.
pub fn url_for_resource(base_url: &str, resource_name: &str) -> String {
    let joined = format!("{base_url}/{resource_name}");
    let bytes = joined.as_bytes();
    let mut out = String::with_capacity(joined.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'/' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        out.push('/');
        if i > 0 && bytes[i - 1] == b':' {
            // Keep the second slash of a scheme separator.
            i += 1;
            if i < bytes.len() && bytes[i] == b'/' {
                out.push('/');
            }
        }
        while i < bytes.len() && bytes[i] == b'/' {
            i += 1;
        }
    }
    out
}

/// OS qualifier for the JRE artifact: `OS_NAME` override, else detection.
pub fn os_name() -> String {
    match env::var("OS_NAME") {
        Ok(name) if !name.is_empty() => name,
        _ => detected_os().to_string(),
    }
}

fn detected_os() -> &'static str {
    if cfg!(target_os = "macos") {
        "macosx"
    } else {
        "linux"
    }
}

/// Path of the bundled JRE's `java` binary, relative to the sandbox.
pub fn java_exec(os_name: &str) -> &'static str {
    if os_name == "macosx" {
        "$(pwd)/jre*/Contents/Home/bin/java"
    } else {
        "$(pwd)/jre*/bin/java"
    }
}
