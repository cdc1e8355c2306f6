//! Global Lua functions and the bindery table

use crate::types::{BundleDecl, DerivedDecl, ProjectDecl, RouteRule, StageDecl, StageName};
use bindery_platform::PlatformInfo;
use mlua::{Lua, Result as LuaResult, Table, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

/// Shared state for collecting declarations during Lua evaluation
#[derive(Default)]
pub struct Declarations {
    pub project: Option<ProjectDecl>,
    pub stages: Vec<StageDecl>,
    pub derived: Vec<DerivedDecl>,
    pub scrub: Vec<PathBuf>,
    pub bundles: Vec<BundleDecl>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Set up the bindery global table with platform information
pub fn setup_bindery_global(lua: &Lua, platform: &PlatformInfo) -> LuaResult<()> {
    let bindery = lua.create_table()?;

    // Platform information
    bindery.set("platform", platform.platform.to_string())?;
    bindery.set("os", platform.os.as_str())?;
    bindery.set("arch", platform.arch.as_str())?;
    bindery.set("hostname", platform.hostname.as_str())?;
    bindery.set("username", platform.username.as_str())?;

    // Boolean helpers
    bindery.set("is_linux", platform.is_linux())?;
    bindery.set("is_darwin", platform.is_darwin())?;
    bindery.set("is_windows", platform.is_windows())?;

    // Version
    bindery.set("version", env!("CARGO_PKG_VERSION"))?;

    lua.globals().set("bindery", bindery)?;

    Ok(())
}

/// Set up the project{} global function
///
/// Usage from Lua:
/// ```lua
/// project {
///     name = "silx",
///     env = { PYBUILD_NAME = "silx", PYBUILD_SYSTEM = "custom" },
/// }
/// ```
pub fn setup_project_function(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
    let project_fn = lua.create_function(move |_, opts: Table| {
        let name: String = opts
            .get::<String>("name")
            .map_err(|_| mlua::Error::runtime("project{} requires a 'name' field"))?;

        let env = parse_env_table(&opts, "env")?;

        let mut decls = declarations.borrow_mut();
        if decls.project.is_some() {
            return Err(mlua::Error::runtime("project{} declared more than once"));
        }
        decls.project = Some(ProjectDecl { name, env });

        Ok(())
    })?;

    lua.globals().set("project", project_fn)?;

    Ok(())
}

/// Set up the stage{} global function
///
/// Usage from Lua:
/// ```lua
/// stage {
///     name = "test",
///     run = { "python3", "run_tests.py", "-v" },
///     env = { LD_LIBRARY_PATH = "build/lib", WITH_QT_TEST = "False" },
/// }
/// ```
pub fn setup_stage_function(
    lua: &Lua,
    declarations: Rc<RefCell<Declarations>>,
    config_dir: PathBuf,
) -> LuaResult<()> {
    let stage_fn = lua.create_function(move |_, opts: Table| {
        let name_str: String = opts
            .get::<String>("name")
            .map_err(|_| mlua::Error::runtime("stage{} requires a 'name' field"))?;

        let stage = StageName::parse(&name_str).ok_or_else(|| {
            mlua::Error::runtime(format!(
                "stage{{}} name must be one of clean/build/docs/test, got '{}'",
                name_str
            ))
        })?;

        let run = parse_argv(&opts, "run")?;
        let env = parse_env_table(&opts, "env")?;

        // Resolve cwd against the build tree root at declaration time
        let cwd = parse_opt_string(&opts, "cwd")?
            .map(|c| bindery_platform::resolve_in_tree(&c, &config_dir))
            .transpose()
            .map_err(|e| mlua::Error::runtime(e.to_string()))?;

        let decl = StageDecl {
            stage,
            run,
            env,
            cwd,
        };

        decl.validate()
            .map_err(|e| mlua::Error::runtime(e.to_string()))?;

        declarations.borrow_mut().stages.push(decl);

        Ok(())
    })?;

    lua.globals().set("stage", stage_fn)?;

    Ok(())
}

/// Set up the derived{} global function
///
/// Usage from Lua:
/// ```lua
/// derived {
///     from = "pyx",
///     strip = { "cpp", "c", "html" },
/// }
/// ```
pub fn setup_derived_function(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
    let derived_fn = lua.create_function(move |_, opts: Table| {
        let from: String = opts
            .get::<String>("from")
            .map_err(|_| mlua::Error::runtime("derived{} requires a 'from' extension"))?;

        let strip_table: Table = opts
            .get::<Table>("strip")
            .map_err(|_| mlua::Error::runtime("derived{} requires a 'strip' array"))?;

        let mut strip = Vec::new();
        for item in strip_table.sequence_values::<String>() {
            strip.push(normalize_ext(&item?));
        }

        let decl = DerivedDecl {
            from: normalize_ext(&from),
            strip,
        };

        decl.validate()
            .map_err(|e| mlua::Error::runtime(e.to_string()))?;

        declarations.borrow_mut().derived.push(decl);

        Ok(())
    })?;

    lua.globals().set("derived", derived_fn)?;

    Ok(())
}

/// Set up the scrub{} global function
///
/// Usage from Lua:
/// ```lua
/// scrub { "build/man", "build/sphinx", ".pybuild" }
/// ```
///
/// Paths are relative to the build tree root and removed recursively on
/// clean; missing paths are ignored.
pub fn setup_scrub_function(lua: &Lua, declarations: Rc<RefCell<Declarations>>) -> LuaResult<()> {
    let scrub_fn = lua.create_function(move |_, opts: Table| {
        let mut paths = Vec::new();
        for item in opts.sequence_values::<String>() {
            let path = item?;
            if path.trim().is_empty() {
                return Err(mlua::Error::runtime("scrub{} entries must be non-empty"));
            }
            paths.push(PathBuf::from(path));
        }

        if paths.is_empty() {
            return Err(mlua::Error::runtime(
                "scrub{} requires at least one directory",
            ));
        }

        declarations.borrow_mut().scrub.extend(paths);

        Ok(())
    })?;

    lua.globals().set("scrub", scrub_fn)?;

    Ok(())
}

/// Set up the bundle{} global function
///
/// Usage from Lua:
/// ```lua
/// bundle {
///     name = "runtime",
///     root = "dist/silx",
///     purge = { "usr/bin" },
///     rules = {
///         { glob = "scripts/*", to = "usr/bin" },
///         { file = "package/desktop/silx.desktop", to = "usr/share/applications" },
///     },
/// }
/// ```
pub fn setup_bundle_function(
    lua: &Lua,
    declarations: Rc<RefCell<Declarations>>,
    config_dir: PathBuf,
) -> LuaResult<()> {
    let bundle_fn = lua.create_function(move |_, opts: Table| {
        let name: String = opts
            .get::<String>("name")
            .map_err(|_| mlua::Error::runtime("bundle{} requires a 'name' field"))?;

        let root: String = opts
            .get::<String>("root")
            .map_err(|_| mlua::Error::runtime("bundle{} requires a 'root' path"))?;

        // Staging roots resolve against the build tree root
        let root = bindery_platform::resolve_in_tree(&root, &config_dir)
            .map_err(|e| mlua::Error::runtime(e.to_string()))?;

        let mut rules = Vec::new();
        if let Ok(rules_table) = opts.get::<Table>("rules") {
            for item in rules_table.sequence_values::<Table>() {
                rules.push(parse_route_rule(&item?)?);
            }
        }

        let mut purge = Vec::new();
        if let Ok(purge_table) = opts.get::<Table>("purge") {
            for item in purge_table.sequence_values::<String>() {
                purge.push(PathBuf::from(item?));
            }
        }

        let keep = parse_opt_string(&opts, "keep")?;

        let decl = BundleDecl {
            name,
            root,
            rules,
            purge,
            keep,
        };

        decl.validate()
            .map_err(|e| mlua::Error::runtime(e.to_string()))?;

        declarations.borrow_mut().bundles.push(decl);

        Ok(())
    })?;

    lua.globals().set("bundle", bundle_fn)?;

    Ok(())
}

/// Parse a single routing rule table
fn parse_route_rule(opts: &Table) -> Result<RouteRule, mlua::Error> {
    let glob = parse_opt_string(opts, "glob")?;
    let file = parse_opt_string(opts, "file")?;
    let to: String = opts
        .get::<String>("to")
        .map_err(|_| mlua::Error::runtime("routing rule requires a 'to' destination"))?;

    let rule = RouteRule {
        glob,
        file: file.map(PathBuf::from),
        to: PathBuf::from(to),
    };

    rule.validate()
        .map_err(|e| mlua::Error::runtime(e.to_string()))?;

    Ok(rule)
}

/// Parse an optional env table into a string map
///
/// Values may be strings, integers, numbers, or booleans; packaging flags
/// like `WITH_QT_TEST = false` are coerced to their string form.
fn parse_env_table(opts: &Table, field: &str) -> Result<BTreeMap<String, String>, mlua::Error> {
    let mut env = BTreeMap::new();

    let table: Value = opts.get(field)?;
    let table = match table {
        Value::Nil => return Ok(env),
        Value::Table(t) => t,
        other => {
            return Err(mlua::Error::runtime(format!(
                "'{}' must be a table, got {}",
                field,
                other.type_name()
            )));
        }
    };

    for pair in table.pairs::<String, Value>() {
        let (name, value) = pair?;
        let value = match value {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            other => {
                return Err(mlua::Error::runtime(format!(
                    "env var '{}' must be a string, number, or boolean, got {}",
                    name,
                    other.type_name()
                )));
            }
        };
        env.insert(name, value);
    }

    Ok(env)
}

/// Parse an optional string field, rejecting other value types
///
/// A mistyped field (e.g. a table where a pattern string belongs) must be
/// an error, not a silently absent option.
fn parse_opt_string(opts: &Table, field: &str) -> Result<Option<String>, mlua::Error> {
    match opts.get::<Value>(field)? {
        Value::Nil => Ok(None),
        Value::String(s) => Ok(Some(s.to_str()?.to_string())),
        other => Err(mlua::Error::runtime(format!(
            "'{}' must be a string, got {}",
            field,
            other.type_name()
        ))),
    }
}

/// Parse a required argv array field
fn parse_argv(opts: &Table, field: &str) -> Result<Vec<String>, mlua::Error> {
    let table: Table = opts
        .get::<Table>(field)
        .map_err(|_| mlua::Error::runtime(format!("stage{{}} requires a '{}' array", field)))?;

    let mut argv = Vec::new();
    for item in table.sequence_values::<String>() {
        argv.push(item?);
    }

    Ok(argv)
}

/// Normalize an extension: accept with or without leading dot
fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with_decls() -> (Lua, Rc<RefCell<Declarations>>) {
        let lua = Lua::new();
        let declarations = Rc::new(RefCell::new(Declarations::new()));
        let config_dir = PathBuf::from("/src/pkg");

        setup_project_function(&lua, declarations.clone()).unwrap();
        setup_stage_function(&lua, declarations.clone(), config_dir.clone()).unwrap();
        setup_derived_function(&lua, declarations.clone()).unwrap();
        setup_scrub_function(&lua, declarations.clone()).unwrap();
        setup_bundle_function(&lua, declarations.clone(), config_dir).unwrap();

        (lua, declarations)
    }

    #[test]
    fn test_bindery_global() {
        let lua = Lua::new();
        let platform = PlatformInfo::current();

        setup_bindery_global(&lua, &platform).unwrap();

        let bindery: Table = lua.globals().get("bindery").unwrap();

        let os: String = bindery.get("os").unwrap();
        assert!(!os.is_empty());

        let is_darwin: bool = bindery.get("is_darwin").unwrap();
        let is_linux: bool = bindery.get("is_linux").unwrap();
        let is_windows: bool = bindery.get("is_windows").unwrap();

        // Exactly one should be true
        assert_eq!(
            [is_darwin, is_linux, is_windows]
                .iter()
                .filter(|&&x| x)
                .count(),
            1
        );
    }

    #[test]
    fn test_project_function() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            project {
                name = "silx",
                env = { PYBUILD_NAME = "silx", USE_GNU_SOURCE = 1 },
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        let project = decls.project.as_ref().unwrap();
        assert_eq!(project.name, "silx");
        assert_eq!(project.env.get("PYBUILD_NAME").unwrap(), "silx");
        assert_eq!(project.env.get("USE_GNU_SOURCE").unwrap(), "1");
    }

    #[test]
    fn test_project_declared_twice_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua
            .load(
                r#"
            project { name = "a" }
            project { name = "b" }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }

    #[test]
    fn test_stage_function() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            stage {
                name = "test",
                run = { "python3", "run_tests.py", "-v" },
                env = { LD_LIBRARY_PATH = "build/lib", WITH_QT_TEST = false },
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(decls.stages.len(), 1);

        let stage = &decls.stages[0];
        assert_eq!(stage.stage, StageName::Test);
        assert_eq!(stage.run, vec!["python3", "run_tests.py", "-v"]);
        assert_eq!(stage.env.get("WITH_QT_TEST").unwrap(), "false");
    }

    #[test]
    fn test_stage_function_cwd_resolved() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            stage {
                name = "build",
                run = { "make" },
                cwd = "build",
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(
            decls.stages[0].cwd.as_deref(),
            Some(std::path::Path::new("/src/pkg/build"))
        );
    }

    #[test]
    fn test_stage_function_unknown_name_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua
            .load(
                r#"
            stage { name = "install", run = { "true" } }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }

    #[test]
    fn test_derived_function() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            derived {
                from = ".pyx",
                strip = { "cpp", ".c", "html" },
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(decls.derived.len(), 1);

        // Leading dots are normalized away
        let derived = &decls.derived[0];
        assert_eq!(derived.from, "pyx");
        assert_eq!(derived.strip, vec!["cpp", "c", "html"]);
    }

    #[test]
    fn test_scrub_function() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            scrub { "build/man", "build/sphinx", ".pybuild" }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(decls.scrub.len(), 3);
        assert_eq!(decls.scrub[0], PathBuf::from("build/man"));
    }

    #[test]
    fn test_scrub_function_empty_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua.load("scrub { }").exec();
        assert!(result.is_err());
    }

    #[test]
    fn test_bundle_function() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            bundle {
                name = "runtime",
                root = "dist/silx",
                purge = { "usr/bin" },
                rules = {
                    { glob = "scripts/*", to = "usr/bin" },
                    { file = "package/desktop/silx.desktop", to = "usr/share/applications" },
                },
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(decls.bundles.len(), 1);

        let bundle = &decls.bundles[0];
        assert_eq!(bundle.name, "runtime");
        assert_eq!(bundle.root, PathBuf::from("/src/pkg/dist/silx"));
        assert_eq!(bundle.rules.len(), 2);
        assert_eq!(bundle.purge, vec![PathBuf::from("usr/bin")]);
        assert!(bundle.rules[1].is_required());
    }

    #[test]
    fn test_bundle_function_keep() {
        let (lua, declarations) = lua_with_decls();

        lua.load(
            r#"
            bundle {
                name = "debug",
                root = "dist/silx-dbg",
                keep = "**/*.so",
            }
        "#,
        )
        .exec()
        .unwrap();

        let decls = declarations.borrow();
        assert_eq!(decls.bundles[0].keep.as_deref(), Some("**/*.so"));
    }

    #[test]
    fn test_bundle_function_keep_table_fails() {
        let (lua, _declarations) = lua_with_decls();

        // A table where the pattern string belongs must not be dropped
        let result = lua
            .load(
                r#"
            bundle {
                name = "debug",
                root = "dist/silx-dbg",
                keep = { "*.so" },
            }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }

    #[test]
    fn test_bundle_function_non_string_glob_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua
            .load(
                r#"
            bundle {
                name = "runtime",
                root = "dist/silx",
                rules = { { glob = 42, to = "usr/bin" } },
            }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }

    #[test]
    fn test_stage_function_non_string_cwd_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua
            .load(
                r#"
            stage { name = "build", run = { "make" }, cwd = { "build" } }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }

    #[test]
    fn test_bundle_function_invalid_rule_fails() {
        let (lua, _declarations) = lua_with_decls();

        let result = lua
            .load(
                r#"
            bundle {
                name = "runtime",
                root = "dist/silx",
                rules = { { to = "usr/bin" } },
            }
        "#,
            )
            .exec();

        assert!(result.is_err());
    }
}
