//! Filtering declared dependencies down to installable packages.
//!
//! Planner output routinely lists standard-library modules as dependencies;
//! passing those to pip either fails or installs an unrelated package of the
//! same name.

/// Python standard-library modules the planner is known to declare.
const STDLIB_MODULES: &[&str] = &[
    "abc",
    "argparse",
    "asyncio",
    "base64",
    "collections",
    "contextlib",
    "copy",
    "csv",
    "dataclasses",
    "datetime",
    "decimal",
    "enum",
    "fractions",
    "functools",
    "glob",
    "hashlib",
    "heapq",
    "io",
    "itertools",
    "json",
    "logging",
    "math",
    "os",
    "pathlib",
    "pickle",
    "random",
    "re",
    "shutil",
    "socket",
    "sqlite3",
    "statistics",
    "string",
    "subprocess",
    "sys",
    "tempfile",
    "threading",
    "time",
    "typing",
    "unittest",
    "urllib",
    "uuid",
];

/// Keep only dependencies that need a pip install.
pub fn filter_installable(dependencies: &[String]) -> Vec<String> {
    dependencies
        .iter()
        .map(|dep| dep.trim())
        .filter(|dep| !dep.is_empty())
        .filter(|dep| {
            let root = dep.split('.').next().unwrap_or(dep);
            !STDLIB_MODULES.contains(&root.to_ascii_lowercase().as_str())
        })
        .map(str::to_string)
        .collect()
}
