//! `${...}` interpolation against an [`ExecutionContext`].
//!
//! Lookup order for a path: exact context key, then the longest dotted
//! prefix holding an object whose fields are walked, then process-wide
//! [`GlobalVariables`] (server names, states, startup progress).
//! Anything that still does not resolve interpolates as empty text.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use autostart_domain::duration::parse_duration;
use autostart_domain::value::Value;

use crate::context::ExecutionContext;

const MAX_PASSES: usize = 5;

/// Variables that exist outside any execution, such as `lobby.status`.
pub trait GlobalVariables: Send + Sync {
    fn resolve(&self, path: &str) -> Option<Value>;
}

/// Stateless interpolation engine; clones share the same globals.
#[derive(Clone, Default)]
pub struct VariableResolver {
    globals: Option<Arc<dyn GlobalVariables>>,
}

impl VariableResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_globals(globals: Arc<dyn GlobalVariables>) -> Self {
        Self {
            globals: Some(globals),
        }
    }

    /// Interpolate every `${path}` in `template`.
    pub fn resolve(&self, template: impl AsRef<str>, ctx: &ExecutionContext) -> String {
        let mut current = template.as_ref().to_string();
        for _ in 0..MAX_PASSES {
            if !current.contains("${") {
                break;
            }
            let next = self.resolve_pass(&current, ctx);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn resolve_pass(&self, input: &str, ctx: &ExecutionContext) -> String {
        let bytes = input.as_bytes();
        let mut out = String::with_capacity(input.len());
        let mut literal_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            if is_open(bytes, i) {
                if let Some(end) = matching_brace(bytes, i) {
                    out.push_str(&input[literal_start..i]);
                    let expr = &input[i + 2..end];
                    let path = if expr.contains("${") {
                        self.resolve_pass(expr, ctx)
                    } else {
                        expr.to_string()
                    };
                    match self.resolve_variable(path.trim(), ctx) {
                        Some(value) => out.push_str(&value.to_string()),
                        None => tracing::trace!(variable = %path, "unresolved variable"),
                    }
                    i = end + 1;
                    literal_start = i;
                    continue;
                }
            }
            i += 1;
        }
        out.push_str(&input[literal_start..]);
        out
    }

    /// Raw value at `path`, without stringification.
    #[must_use]
    pub fn resolve_variable(&self, path: &str, ctx: &ExecutionContext) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        if let Some(value) = ctx.get(path) {
            return Some(value);
        }
        for (split, _) in path.rmatch_indices('.') {
            let Some(root) = ctx.get(&path[..split]) else {
                continue;
            };
            let walked = path[split + 1..]
                .split('.')
                .try_fold(root, |value, segment| value.field(segment));
            if walked.is_some() {
                return walked;
            }
        }
        self.globals.as_ref().and_then(|g| g.resolve(path))
    }

    /// Whole-string references (`${connection}`) return the raw value; any
    /// other template is interpolated into a [`Value::Str`].
    #[must_use]
    pub fn resolve_value(&self, template: impl AsRef<str>, ctx: &ExecutionContext) -> Value {
        let template = template.as_ref().trim();
        if is_full_reference(template) {
            let inner = extract_variable_name(template);
            let path = if inner.contains("${") {
                self.resolve(inner, ctx)
            } else {
                inner.to_string()
            };
            return self
                .resolve_variable(path.trim(), ctx)
                .unwrap_or_default();
        }
        Value::Str(self.resolve(template, ctx))
    }

    fn resolve_non_blank(&self, raw: &str, ctx: &ExecutionContext) -> Option<String> {
        if raw.trim().is_empty() {
            return None;
        }
        let resolved = self.resolve(raw, ctx);
        let trimmed = resolved.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Resolve and parse a duration, `default` when blank or malformed.
    pub fn resolve_duration(
        &self,
        raw: impl AsRef<str>,
        ctx: &ExecutionContext,
        default: Duration,
    ) -> Duration {
        self.resolve_opt_duration(raw, ctx).unwrap_or(default)
    }

    /// Resolve and parse a duration, `None` when blank or malformed.
    pub fn resolve_opt_duration(
        &self,
        raw: impl AsRef<str>,
        ctx: &ExecutionContext,
    ) -> Option<Duration> {
        let resolved = self.resolve_non_blank(raw.as_ref(), ctx)?;
        parse_duration(&resolved)
            .inspect_err(|err| tracing::debug!(value = %resolved, %err, "failed to parse duration"))
            .ok()
    }

    pub fn resolve_int(&self, raw: impl AsRef<str>, ctx: &ExecutionContext, default: i32) -> i32 {
        self.parse_with(raw.as_ref(), ctx, "integer").unwrap_or(default)
    }

    pub fn resolve_i64(&self, raw: impl AsRef<str>, ctx: &ExecutionContext, default: i64) -> i64 {
        self.parse_with(raw.as_ref(), ctx, "integer").unwrap_or(default)
    }

    pub fn resolve_f64(&self, raw: impl AsRef<str>, ctx: &ExecutionContext, default: f64) -> f64 {
        self.parse_with(raw.as_ref(), ctx, "number").unwrap_or(default)
    }

    /// Number parse for optional bounds; `None` when blank or malformed.
    pub fn resolve_opt_f64(&self, raw: impl AsRef<str>, ctx: &ExecutionContext) -> Option<f64> {
        self.parse_with(raw.as_ref(), ctx, "number")
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve_f32_clamped(
        &self,
        raw: impl AsRef<str>,
        ctx: &ExecutionContext,
        default: f32,
        min: f32,
        max: f32,
    ) -> f32 {
        let value = self.resolve_f64(raw, ctx, f64::from(default)) as f32;
        value.clamp(min, max)
    }

    /// `true|yes|1|on` and `false|no|0|off`, case-insensitive.
    pub fn resolve_bool(&self, raw: impl AsRef<str>, ctx: &ExecutionContext, default: bool) -> bool {
        let Some(resolved) = self.resolve_non_blank(raw.as_ref(), ctx) else {
            return default;
        };
        match resolved.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => true,
            "false" | "no" | "0" | "off" => false,
            _ => default,
        }
    }

    /// Parse through [`FromStr`], tolerating case and `-`/`_` differences.
    pub fn resolve_enum<T: FromStr>(
        &self,
        raw: impl AsRef<str>,
        ctx: &ExecutionContext,
        default: T,
    ) -> T {
        let Some(resolved) = self.resolve_non_blank(raw.as_ref(), ctx) else {
            return default;
        };
        let candidates = [
            resolved.clone(),
            resolved.to_ascii_lowercase(),
            resolved.to_ascii_lowercase().replace('-', "_"),
            resolved.to_ascii_uppercase().replace('-', "_"),
        ];
        candidates
            .iter()
            .find_map(|candidate| candidate.parse().ok())
            .unwrap_or_else(|| {
                tracing::debug!(value = %resolved, "failed to parse enum value");
                default
            })
    }

    /// Comma-separated list, trimmed, empty items dropped.
    pub fn resolve_list(&self, raw: impl AsRef<str>, ctx: &ExecutionContext) -> Vec<String> {
        self.resolve(raw, ctx)
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn parse_with<T: FromStr>(&self, raw: &str, ctx: &ExecutionContext, what: &str) -> Option<T> {
        let resolved = self.resolve_non_blank(raw, ctx)?;
        let parsed = resolved.parse().ok();
        if parsed.is_none() {
            tracing::debug!(value = %resolved, "failed to parse {what}");
        }
        parsed
    }
}

fn is_open(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{')
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = start;
    while j < bytes.len() {
        if is_open(bytes, j) {
            depth += 1;
            j += 2;
        } else if bytes[j] == b'}' {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(j);
            }
            j += 1;
        } else {
            j += 1;
        }
    }
    None
}

/// `true` when the whole string is one `${...}` reference.
#[must_use]
pub fn is_full_reference(input: &str) -> bool {
    input.starts_with("${") && matching_brace(input.as_bytes(), 0) == Some(input.len() - 1)
}

/// Strip one `${` `}` wrapper; other input is returned unchanged.
#[must_use]
pub fn extract_variable_name(input: &str) -> &str {
    input
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(input)
}
