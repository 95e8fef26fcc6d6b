/*
 * This module provides utility functions for path manipulation: locating the
 * application's configuration directory, and turning absolute paths into the
 * forward-slash relative form (with `../` for files beside the base directory) used
 * for sorting and in export markers.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::{Component, Path, PathBuf};

/*
 * Retrieves the application's primary local configuration directory.
 * This function determines the platform-specific path for local (non-roaming)
 * application configuration data. It ensures the directory exists, creating it
 * if necessary.
 *
 * Returns `None` if the directory could not be determined or created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Attempting to get base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {config_path:?}: {e}"
                );
                return None;
            }
            log::debug!("PathUtils: Created base app config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

/*
 * Renders `path` relative to `base` with '/' separators. A path beside `base` (a linked
 * file from a sibling folder) climbs out with `../` segments. Only when the two share no
 * root at all, such as different drives, is the path rendered in full.
 */
pub fn relative_display_path(path: &Path, base: &Path) -> String {
    if let Ok(inside) = path.strip_prefix(base) {
        return to_forward_slashes(inside);
    }
    match relative_path_between(path, base) {
        Some(relative) => to_forward_slashes(&relative),
        None => to_forward_slashes(path),
    }
}

fn relative_path_between(path: &Path, base: &Path) -> Option<PathBuf> {
    let path_components: Vec<Component> = path.components().collect();
    let base_components: Vec<Component> = base.components().collect();
    let common = path_components
        .iter()
        .zip(&base_components)
        .take_while(|(a, b)| a == b)
        .count();
    let shares_root = path_components
        .first()
        .zip(base_components.first())
        .is_some_and(|(a, b)| a == b && matches!(a, Component::RootDir | Component::Prefix(_)));
    if common == 0 || !shares_root {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in &base_components[common..] {
        match component {
            Component::Normal(_) => relative.push(".."),
            Component::CurDir => {}
            // `..` inside the base cannot be undone without touching the file system.
            _ => return None,
        }
    }
    for component in &path_components[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}

pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/*
 * Resolves a path written inside a solution file against the solution directory.
 * Solution files use '\' regardless of platform, and may contain `..` segments.
 */
pub fn resolve_solution_reference(solution_dir: &Path, reference: &str) -> PathBuf {
    let normalized = reference.trim().replace('\\', "/");
    let mut resolved = solution_dir.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::RootDir | Component::Prefix(_) => {
                resolved = PathBuf::from(&normalized);
                break;
            }
        }
    }
    resolved
}
