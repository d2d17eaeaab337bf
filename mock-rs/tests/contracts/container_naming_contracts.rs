//! Container Naming Contract Tests
//!
//! Containers are found again only through their name, which is derived from
//! the examples directory. There is no other bookkeeping to fall back on.

use mockpit::manager::CONTAINER_PREFIX;
use mockpit::ContainerManager;
use std::path::Path;

/// WHY: The name is a pure function of the absolute directory path
/// REASON: `stop` after a process restart must find the container `start` made
/// BREAKS: Orphaned containers and name conflicts on the next `start`
#[test]
fn name_is_deterministic() {
    let first = ContainerManager::container_name(Path::new("/work/api/examples")).unwrap();
    let second = ContainerManager::container_name(Path::new("/work/api/examples")).unwrap();
    assert_eq!(first, second);
}

/// WHY: Equivalent spellings of a directory share a container
/// REASON: Callers pass paths with trailing separators or `.` segments
/// BREAKS: `stop` reports not-found for a running container
#[test]
fn equivalent_paths_share_a_name() {
    let plain = ContainerManager::container_name(Path::new("/work/api/examples")).unwrap();
    let trailing = ContainerManager::container_name(Path::new("/work/api/examples/")).unwrap();
    let dotted = ContainerManager::container_name(Path::new("/work/./api/examples")).unwrap();
    assert_eq!(plain, trailing);
    assert_eq!(plain, dotted);

    let cwd = std::env::current_dir().unwrap();
    assert_eq!(
        ContainerManager::container_name(Path::new("examples")).unwrap(),
        ContainerManager::container_name(&cwd.join("examples")).unwrap()
    );
}

/// WHY: Different directories never share a container
/// REASON: Isolation between test suites is per directory
/// BREAKS: Suites arm and drain each other's expectations
#[test]
fn different_directories_get_different_names() {
    let a = ContainerManager::container_name(Path::new("/work/api/examples")).unwrap();
    let b = ContainerManager::container_name(Path::new("/work/web/examples")).unwrap();
    assert_ne!(a, b);
}

/// WHY: Names only use characters Docker accepts
/// REASON: Docker names must match [a-zA-Z0-9][a-zA-Z0-9_.-]+
/// BREAKS: `create` fails for every directory
#[test]
fn name_is_a_valid_docker_name() {
    let name = ContainerManager::container_name(Path::new("/tmp/with spaces/ünïcode")).unwrap();
    assert!(name.starts_with(CONTAINER_PREFIX));
    assert!(name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'));
}
