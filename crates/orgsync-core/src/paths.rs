use crate::model::RepoDescriptor;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

pub const ROOT_LEVEL_SNIPPETS_DIR: &str = "_ghorg_root_level_snippets";
const MAX_COLLISION_SLUG_LEN: usize = 248;

/// Directory name derived from a clone or browse URL: the last segment with
/// its final extension removed (`.../api.git` -> `api`).
pub fn app_name_from_url(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => last.to_string(),
    }
}

/// A slug must name exactly one directory below the destination root.
pub fn is_path_segment_safe(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
        && !segment.contains('/')
        && !segment.contains(MAIN_SEPARATOR)
}

/// A preserved provider path must stay below the destination root.
pub fn is_relative_path_safe(path: &str) -> bool {
    !path.is_empty()
        && !Path::new(path).is_absolute()
        && !path.starts_with(['/', '\\'])
        && path.split(['/', '\\']).all(|segment| segment != "..")
}

/// Slug assigned before collision handling.
pub fn initial_slug(repo: &RepoDescriptor, preserve_directory_structure: bool) -> String {
    if preserve_directory_structure && !repo.path.is_empty() {
        return repo.path.clone();
    }
    let slug = if repo.is_repo_snippet() {
        app_name_from_url(&repo.snippet.repo_url)
    } else if repo.is_root_level_snippet {
        repo.name.clone()
    } else {
        app_name_from_url(&repo.url)
    };
    if slug.is_empty() {
        repo.name.clone()
    } else {
        slug
    }
}

/// Flattens a provider path such as `group/sub/api` into `group_sub_api`.
pub fn flatten_provider_path(path: &str) -> String {
    let flattened = path.replace(['/', '\\'], "_");
    trim_collision_filename(&flattened)
}

/// Keeps collision slugs under common filesystem name limits by cutting at
/// the last `_` before the limit.
pub fn trim_collision_filename(filename: &str) -> String {
    if filename.len() <= MAX_COLLISION_SLUG_LEN {
        return filename.to_string();
    }
    let mut end = MAX_COLLISION_SLUG_LEN;
    while !filename.is_char_boundary(end) {
        end -= 1;
    }
    let head = &filename[..end];
    match head.rfind('_') {
        Some(cut) if cut > 0 => head[..cut].to_string(),
        _ => head.to_string(),
    }
}

pub fn with_suffixes(repo: &RepoDescriptor, slug: String) -> String {
    let mut slug = slug;
    if repo.is_wiki && !slug.ends_with(".wiki") {
        slug.push_str(".wiki");
    }
    if repo.is_repo_snippet() && !slug.ends_with(".snippets") {
        slug.push_str(".snippets");
    }
    slug
}

pub fn build_host_path(root: &Path, repo: &RepoDescriptor, slug: &str) -> PathBuf {
    let snippet_dir = || format!("{}-{}", repo.snippet.title, repo.snippet.id);
    if repo.is_root_level_snippet {
        return root.join(ROOT_LEVEL_SNIPPETS_DIR).join(snippet_dir());
    }
    if repo.is_snippet {
        return root.join(slug).join(snippet_dir());
    }
    root.join(slug)
}
