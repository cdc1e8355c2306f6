//! Template content for the bindery init command

/// Template for a new rules.lua entry point
pub const RULES_LUA_TEMPLATE: &str = r#"-- bindery packaging rules
--
-- Declarations collected here drive the pipeline:
--   clean -> build -> test -> install
--
-- Platform facts are available through the `bindery` table
-- (bindery.os, bindery.arch, bindery.is_linux, ...).

project {
    name = "mypackage",
    -- Environment re-exported to every stage subprocess
    env = {
        -- PYBUILD_NAME = "mypackage",
    },
}

-- External stage commands. All are optional; undeclared stages are
-- skipped. `docs` runs only after a successful build.
stage {
    name = "clean",
    run = { "make", "clean" },
}

stage {
    name = "build",
    run = { "make", "all" },
}

-- stage {
--     name = "docs",
--     run = { "make", "-C", "doc", "html", "man" },
-- }

stage {
    name = "test",
    run = { "python3", "run_tests.py", "-v" },
    env = {
        LD_LIBRARY_PATH = "build/lib",
        WITH_GUI_TEST = "False",
    },
}

-- Files regenerated from templated sources; stripped on clean so the
-- next build regenerates everything.
-- derived {
--     from = "pyx",
--     strip = { "cpp", "c", "html" },
-- }

-- Generated directories removed wholesale on clean.
scrub { "build" }

-- Output bundles. Rules apply in order; the first rule to claim a file
-- wins. `file` rules are required, `glob` rules route what matches.
bundle {
    name = "runtime",
    root = "dist/mypackage",
    purge = { "usr/bin" },
    rules = {
        { glob = "scripts/*", to = "usr/bin" },
        { glob = "build/man/*.1", to = "usr/share/man/man1" },
        -- { file = "package/desktop/mypackage.desktop", to = "usr/share/applications" },
    },
}

bundle {
    name = "doc",
    root = "dist/mypackage-doc",
    rules = {
        { glob = "build/sphinx/html/**/*", to = "usr/share/doc/mypackage/html" },
    },
}

-- Debug bundles keep only compiled binaries.
-- bundle {
--     name = "debug",
--     root = "dist/mypackage-dbg",
--     keep = "*.so",
-- }
"#;
