//! Embedded scaffold templates.

/// Next.js `package.json`.
pub(crate) const NEXTJS_PACKAGE_JSON: &str = include_str!("nextjs/package.json");

/// Next.js `pages/index.js`.
pub(crate) const NEXTJS_INDEX: &str = include_str!("nextjs/index.js");

/// Plain Node `package.json`.
pub(crate) const NODE_PACKAGE_JSON: &str = include_str!("node/package.json");

/// Plain Node HTTP server entry point.
pub(crate) const NODE_INDEX: &str = include_str!("node/index.js");

/// `.gitignore` shared by every template.
pub(crate) const GITIGNORE: &str = include_str!("gitignore");
