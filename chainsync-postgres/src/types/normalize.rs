//! Canonical spelling of Postgres types and default expressions.
//!
//! Postgres accepts many spellings for the same type (`integer`, `int`, `int4`) and the catalog
//! reports yet another one (`integer` in `information_schema`, `_int4` for arrays). Diffing
//! compares columns through [`normalize_type`] so cosmetic differences never surface as schema
//! changes.

macro_rules! define_type_aliases {
    (
        $(
            $canonical:literal => [$($alias:literal),* $(,)?]
        ),* $(,)?
    ) => {
        /// Returns the canonical bucket of a lowercased, modifier free type spelling.
        fn canonical_type(spelling: &str) -> Option<&'static str> {
            match spelling {
                $(
                    $canonical $(| $alias)* => Some($canonical),
                )*
                _ => None,
            }
        }

        #[cfg(test)]
        fn type_alias_table() -> Vec<(&'static str, &'static str)> {
            vec![
                $(
                    ($canonical, $canonical),
                    $(($alias, $canonical),)*
                )*
            ]
        }
    };
}

define_type_aliases! {
    // Integers
    "int2" => ["smallint", "smallserial", "serial2"],
    "int4" => ["integer", "int", "serial", "serial4"],
    "int8" => ["bigint", "bigserial", "serial8"],

    // Arbitrary precision
    "numeric" => ["decimal"],

    // Floating point
    "float4" => ["real"],
    "float8" => ["double precision", "float"],

    "bool" => ["boolean"],

    // Character types
    "char" => ["character", "bpchar"],
    "varchar" => ["character varying"],
    "text" => [],

    "json" => [],
    "jsonb" => [],

    // Date/time types
    "date" => [],
    "time" => ["time without time zone"],
    "timetz" => ["time with time zone"],
    "timestamp" => ["timestamp without time zone"],
    "timestamptz" => ["timestamp with time zone"],
}

/// Maps a SQL type spelling to its canonical form.
///
/// Matching is case-insensitive, collapses whitespace and ignores length or precision modifiers,
/// so `VARCHAR(42)`, `character varying` and `varchar` all yield `varchar`. Array spellings keep
/// a `[]` suffix after their element type, both in the `int4[]` form and in the `_int4` form
/// reported by `udt_name`. Spellings outside of the known buckets are returned unchanged.
pub fn normalize_type(raw: &str) -> String {
    if let Some(bucket) = float_precision_bucket(raw) {
        return bucket;
    }

    let lowered = collapse_whitespace(&strip_modifiers(&raw.to_lowercase()));

    if let Some(element) = lowered.strip_suffix("[]") {
        return format!("{}[]", normalize_type(element));
    }

    if let Some(canonical) = lowered.strip_prefix('_').and_then(canonical_type) {
        return format!("{canonical}[]");
    }

    match canonical_type(&lowered) {
        Some(canonical) => canonical.to_string(),
        None => raw.to_string(),
    }
}

/// Resolves `float(p)`, which Postgres stores as `real` up to 24 bits of precision and as
/// `double precision` above.
fn float_precision_bucket(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let rest = compact.strip_prefix("float(")?;
    let (precision, suffix) = rest.split_once(')')?;
    let precision: u32 = precision.parse().ok()?;

    let bucket = if precision <= 24 { "float4" } else { "float8" };
    match suffix {
        "" => Some(bucket.to_string()),
        "[]" => Some(format!("{bucket}[]")),
        _ => None,
    }
}

/// Canonicalizes a default expression for comparison.
///
/// The catalog reports defaults with explicit casts (`'0'::integer`, `'abc'::character varying`)
/// while specs usually declare the bare literal. Trailing casts, wrapping parentheses and the
/// quotes of a single string literal are removed, and unquoted expressions are lowercased.
pub fn normalize_default(raw: &str) -> String {
    let mut value = raw.trim();

    loop {
        let stripped = strip_wrapping_parens(strip_trailing_cast(value));
        if stripped == value {
            break;
        }
        value = stripped;
    }

    if let Some(literal) = string_literal_contents(value) {
        return literal.replace("''", "'");
    }

    value.to_lowercase()
}

/// Removes every parenthesized segment, e.g. `numeric(78, 0)` becomes `numeric`.
fn strip_modifiers(spelling: &str) -> String {
    let mut result = String::with_capacity(spelling.len());
    let mut depth = 0usize;

    for c in spelling.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => result.push(c),
            _ => {}
        }
    }

    result
}

fn collapse_whitespace(spelling: &str) -> String {
    spelling.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips one trailing `::type` cast if it sits outside of quotes and parentheses.
fn strip_trailing_cast(value: &str) -> &str {
    let Some(index) = value.rfind("::") else {
        return value;
    };

    let (expression, cast) = (&value[..index], &value[index + 2..]);
    let quotes_balanced = expression.matches('\'').count() % 2 == 0;
    let type_like = !cast.is_empty()
        && cast.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | '[' | ']' | ',' | '"')
        });

    if quotes_balanced && type_like && parens_balanced(expression) && parens_balanced(cast) {
        expression.trim_end()
    } else {
        value
    }
}

/// Strips one pair of parentheses if they wrap the whole expression.
fn strip_wrapping_parens(value: &str) -> &str {
    let Some(inner) = value
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return value;
    };

    // `(a) + (b)` starts and ends with parentheses without being wrapped by them.
    if parens_balanced(inner) {
        inner.trim()
    } else {
        value
    }
}

fn parens_balanced(value: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quotes = false;

    for c in value.chars() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0
}

/// Returns the contents of a single quoted string literal spanning the whole value.
fn string_literal_contents(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('\'')?.strip_suffix('\'')?;

    // Reject `'a' || 'b'`: any quote left inside must be an escaped pair.
    if inner.replace("''", "").contains('\'') {
        return None;
    }

    Some(inner)
}
