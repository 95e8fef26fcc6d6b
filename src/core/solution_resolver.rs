/*
 * Resolves a solution descriptor into the ordered list of projects it declares.
 *
 * Supported inputs:
 * - classic `.sln` files, where each project is declared on a line of the form
 *   `Project("{type-guid}") = "Name", "relative\path\Name.csproj", "{project-guid}"`;
 * - XML `.slnx` files, where each project is a `<Project Path="..." />` element;
 * - a project manifest opened directly, which resolves to that single project.
 *
 * Only the project name and manifest path are extracted. Entries without a manifest
 * on disk (solution folders, unloaded or missing projects) are dropped.
 */
use crate::core::path_utils;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SLN_HEADER: &str = "Microsoft Visual Studio Solution File";
const PROJECT_TAG: &str = "<Project";
const SOLUTION_FOLDER_TYPE_GUID: &str = "2150E333-8FDC-42A3-9474-1A3956D46DE8";

#[derive(Debug)]
pub enum ResolutionError {
    Io(PathBuf, io::Error),
    UnsupportedFormat(PathBuf),
    Malformed(PathBuf, String),
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::Io(path, e) => write!(f, "Could not read solution {path:?}: {e}"),
            ResolutionError::UnsupportedFormat(path) => {
                write!(f, "Unsupported solution file type: {path:?}")
            }
            ResolutionError::Malformed(path, reason) => {
                write!(f, "Malformed solution {path:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolutionError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub name: String,
    pub manifest_path: PathBuf,
}

impl ProjectDescriptor {
    pub fn project_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new("."))
    }
}

pub trait SolutionResolverOperations: Send + Sync {
    /* Projects in declaration order, restricted to manifests that exist on disk. */
    fn resolve(&self, solution_path: &Path) -> Result<Vec<ProjectDescriptor>>;
}

/*
 * Resolver for Visual Studio style solutions. `project_extensions` decides which
 * files count as project manifests when one is opened directly.
 */
pub struct CoreSolutionResolver {
    project_extensions: Vec<String>,
}

impl CoreSolutionResolver {
    pub fn new(project_extensions: Vec<String>) -> Self {
        CoreSolutionResolver {
            project_extensions: project_extensions
                .into_iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }

    fn is_project_manifest(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.project_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }
}

impl SolutionResolverOperations for CoreSolutionResolver {
    fn resolve(&self, solution_path: &Path) -> Result<Vec<ProjectDescriptor>> {
        let extension = solution_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let solution_dir = solution_path.parent().unwrap_or(Path::new("."));

        let declared = if self.is_project_manifest(solution_path) {
            if !solution_path.is_file() {
                return Err(ResolutionError::Io(
                    solution_path.to_path_buf(),
                    io::Error::new(io::ErrorKind::NotFound, "project manifest not found"),
                ));
            }
            vec![ProjectDescriptor {
                name: file_stem(solution_path),
                manifest_path: solution_path.to_path_buf(),
            }]
        } else {
            let contents = fs::read_to_string(solution_path)
                .map_err(|e| ResolutionError::Io(solution_path.to_path_buf(), e))?;
            match extension.as_str() {
                "sln" => parse_sln(solution_path, solution_dir, &contents)?,
                "slnx" => parse_slnx(solution_path, solution_dir, &contents)?,
                _ => return Err(ResolutionError::UnsupportedFormat(solution_path.to_path_buf())),
            }
        };

        let projects: Vec<ProjectDescriptor> = declared
            .into_iter()
            .filter(|project| {
                let exists = project.manifest_path.is_file();
                if !exists {
                    log::warn!(
                        "SolutionResolver: Skipping project '{}', manifest {:?} not found.",
                        project.name,
                        project.manifest_path
                    );
                }
                exists
            })
            .collect();
        log::info!(
            "SolutionResolver: Resolved {} projects from {solution_path:?}.",
            projects.len()
        );
        Ok(projects)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/* Parses the `Project(...)` declarations of a classic solution file. */
fn parse_sln(
    solution_path: &Path,
    solution_dir: &Path,
    contents: &str,
) -> Result<Vec<ProjectDescriptor>> {
    if !contents.contains(SLN_HEADER) {
        return Err(ResolutionError::Malformed(
            solution_path.to_path_buf(),
            "missing solution file header".to_string(),
        ));
    }

    let mut projects = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if !line.starts_with("Project(") {
            continue;
        }
        let Some((type_part, declaration)) = line.split_once('=') else {
            return Err(ResolutionError::Malformed(
                solution_path.to_path_buf(),
                format!("line {}: project declaration without '='", line_number + 1),
            ));
        };
        if type_part.to_uppercase().contains(SOLUTION_FOLDER_TYPE_GUID) {
            continue;
        }
        let fields: Vec<&str> = declaration
            .split(',')
            .map(|field| field.trim().trim_matches('"'))
            .collect();
        let [name, relative_path, ..] = fields.as_slice() else {
            return Err(ResolutionError::Malformed(
                solution_path.to_path_buf(),
                format!("line {}: expected name and path", line_number + 1),
            ));
        };
        projects.push(ProjectDescriptor {
            name: name.to_string(),
            manifest_path: path_utils::resolve_solution_reference(solution_dir, relative_path),
        });
    }
    Ok(projects)
}

/* Extracts `Path` attributes of `<Project>` elements from an XML solution file. */
fn parse_slnx(
    solution_path: &Path,
    solution_dir: &Path,
    contents: &str,
) -> Result<Vec<ProjectDescriptor>> {
    if !contents.contains("<Solution") {
        return Err(ResolutionError::Malformed(
            solution_path.to_path_buf(),
            "missing <Solution> element".to_string(),
        ));
    }

    let mut projects = Vec::new();
    let mut rest = contents;
    while let Some(start) = rest.find(PROJECT_TAG) {
        let element = &rest[start..];
        let end = element.find('>').ok_or_else(|| {
            ResolutionError::Malformed(
                solution_path.to_path_buf(),
                "unterminated <Project> element".to_string(),
            )
        })?;
        let tag = &element[..end];
        rest = &element[end..];

        // `<Projects>` or similar longer element names are not project entries.
        if !tag[PROJECT_TAG.len()..].starts_with(|c: char| c.is_whitespace() || c == '/') {
            continue;
        }
        let Some(relative_path) = xml_attribute(tag, "Path") else {
            log::warn!("SolutionResolver: <Project> element without Path in {solution_path:?}.");
            continue;
        };
        let manifest_path = path_utils::resolve_solution_reference(solution_dir, &relative_path);
        projects.push(ProjectDescriptor {
            name: file_stem(&manifest_path),
            manifest_path,
        });
    }
    Ok(projects)
}

fn xml_attribute(tag: &str, attribute: &str) -> Option<String> {
    let needle = format!("{attribute}=");
    let mut search_from = 0;
    while let Some(found) = tag[search_from..].find(&needle) {
        let position = search_from + found;
        let preceded_by_space = tag[..position]
            .chars()
            .last()
            .is_some_and(char::is_whitespace);
        let value_start = position + needle.len();
        if preceded_by_space {
            let quote = tag[value_start..].chars().next()?;
            if quote == '"' || quote == '\'' {
                let value = &tag[value_start + 1..];
                let value_end = value.find(quote)?;
                return Some(value[..value_end].replace("&amp;", "&"));
            }
        }
        search_from = value_start;
    }
    None
}
