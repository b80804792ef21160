//! The template function library.
//!
//! Each function is a registry entry with a name, a usage string and an
//! implementation. Functions draw all randomness from the caller's RNG
//! and reach attributes through the shared cache, so one entity pass
//! stays internally consistent.

use chrono::format::StrftimeItems;
use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use mimeo_model::{Cache, EntityKind, Gender, ResolvedValue};

use crate::error::{EngineError, EngineResult};
use crate::resolver::Resolver;

/// The result of one function evaluation.
#[derive(Debug, Clone)]
pub struct FuncValue {
    pub value: String,
    pub gender: Gender,
}

impl FuncValue {
    pub fn neutral(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            gender: Gender::Neutral,
        }
    }
}

/// Everything a function needs while evaluating: the resolver for
/// attribute references, the pass cache, the parent attribute scope
/// and the pass RNG.
pub struct FuncContext<'a> {
    pub resolver: &'a Resolver,
    pub cache: &'a mut Cache,
    pub parent: &'a str,
    pub rng: &'a mut ChaCha8Rng,
}

/// A single template function.
pub trait TemplateFn: Send + Sync {
    fn name(&self) -> &'static str;
    fn usage(&self) -> &'static str;
    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue>;
}

/// Lookup table of every known function, in declaration order.
pub struct FuncRegistry {
    funcs: Vec<Box<dyn TemplateFn>>,
}

impl Default for FuncRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self {
            funcs: vec![
                Box::new(StrFn),
                Box::new(NumFn),
                Box::new(DateFn),
                Box::new(TimeFn),
                Box::new(GenFn),
                Box::new(RandFn),
                Box::new(PickFn),
                Box::new(SampleFn),
                Box::new(RefFn),
                Box::new(IfFn),
                Box::new(MathFn),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn TemplateFn> {
        self.funcs
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .map(Box::as_ref)
    }

    /// Comma-separated list of the known function names.
    pub fn known(&self) -> String {
        self.funcs
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TemplateFn> {
        self.funcs.iter().map(Box::as_ref)
    }
}

fn arg_error(called: &str, func: &str, message: impl AsRef<str>) -> EngineError {
    EngineError::Func {
        called: called.to_string(),
        message: format!("{}. Use func.{func}(--help) for help.", message.as_ref()),
    }
}

fn plain_error(called: &str, message: impl Into<String>) -> EngineError {
    EngineError::Func {
        called: called.to_string(),
        message: message.into(),
    }
}

/// Parses `N` into (-1, N) and `a-b` into (a, b). Negative numbers are
/// not representable because `-` is the range separator.
fn get_range(arg: &str) -> Option<(i64, i64)> {
    match arg.split_once('-') {
        Some((lo, hi)) => {
            let min = lo.trim().parse::<i64>().ok()?;
            let max = hi.trim().parse::<i64>().ok()?;
            Some((min, max))
        }
        None => {
            let max = arg.trim().parse::<i64>().ok()?;
            Some((-1, max))
        }
    }
}

/// Formats a float without a trailing `.0` for integral values.
fn format_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn random_digit<R: Rng>(rng: &mut R) -> char {
    (b'0' + rng.random_range(0..10u8)) as char
}

fn random_upper<R: Rng>(rng: &mut R) -> char {
    (b'A' + rng.random_range(0..26u8)) as char
}

fn random_lower<R: Rng>(rng: &mut R) -> char {
    (b'a' + rng.random_range(0..26u8)) as char
}

/// UUID v4 built from the pass RNG so seeded runs reproduce.
fn random_uuid(rng: &mut ChaCha8Rng) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Appends `.` plus the requested number of random decimal digits.
fn add_decimal_places<R: Rng>(arg: &str, out: &mut String, rng: &mut R) -> bool {
    let Ok(dp) = arg.parse::<i64>() else {
        return false;
    };
    if dp < 0 {
        return false;
    }
    if dp > 0 {
        out.push('.');
        for _ in 0..dp {
            out.push(random_digit(rng));
        }
    }
    true
}

/// Truncates (`t` suffix) or rounds (`r` suffix, the default) to the
/// requested number of decimal places.
fn apply_decimal_places(arg: &str, value: &mut f64) -> bool {
    if arg.is_empty() {
        return false;
    }

    let (digits, truncate) = match arg.strip_suffix(['t', 'r']) {
        Some(digits) => (digits, arg.ends_with('t')),
        None => (arg, false),
    };

    let Ok(dp) = digits.parse::<i32>() else {
        return false;
    };
    if dp < 0 {
        return false;
    }

    let shift = 10f64.powi(dp);
    if truncate {
        *value = (*value * shift).trunc() / shift;
    } else {
        // Half-way cases round away from zero.
        *value = (*value * shift).round() / shift;
    }

    true
}

/// Accepts dates, date-times and bare times. Bare times are anchored
/// to 1970-01-01 so only the time part is meaningful.
fn parse_datetime(arg: &str) -> Option<NaiveDateTime> {
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(arg, fmt) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(arg, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    for fmt in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(arg, fmt) {
            return Some(NaiveDate::from_ymd_opt(1970, 1, 1)?.and_time(time));
        }
    }

    None
}

fn start_date(called: &str, func: &str, arg: &str) -> EngineResult<NaiveDateTime> {
    if arg.eq_ignore_ascii_case("NOW") {
        return Ok(chrono::Local::now().naive_local());
    }
    parse_datetime(arg).ok_or_else(|| {
        arg_error(
            called,
            func,
            format!("first argument '{arg}' is not NOW or a recognized date/time"),
        )
    })
}

/// Formats with strftime syntax, rejecting bad format strings instead
/// of panicking.
fn format_date(date: NaiveDateTime, fmt: &str) -> Option<String> {
    let items = StrftimeItems::new(fmt).parse().ok()?;
    Some(date.format_with_items(items.iter()).to_string())
}

fn add_months_signed(date: NaiveDateTime, months: i64) -> NaiveDateTime {
    if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
            .unwrap_or(date)
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs() as u32))
            .unwrap_or(date)
    }
}

fn get_adjusted(date: NaiveDateTime, amount: i64, unit: char) -> NaiveDateTime {
    match unit {
        'y' => add_months_signed(date, amount * 12),
        'M' => add_months_signed(date, amount),
        'd' => date + Duration::days(amount),
        'H' => date + Duration::hours(amount),
        'm' => date + Duration::minutes(amount),
        _ => date + Duration::seconds(amount),
    }
}

/// Applies a `[+|-]num[-num]unit` adjustment. A range picks a random
/// point between the two adjusted dates, including fractional units.
fn adjust_date<R: Rng>(
    date: NaiveDateTime,
    arg: &str,
    valid_units: &[char],
    rng: &mut R,
) -> Result<NaiveDateTime, String> {
    const FORMAT_MSG: &str = "must be in format [+|-]num[-num]unit";

    if arg.len() < 2 {
        return Err(FORMAT_MSG.to_string());
    }

    let signed = if arg.starts_with('+') || arg.starts_with('-') {
        arg.to_string()
    } else {
        format!("+{arg}")
    };
    let negative = signed.starts_with('-');

    let Some(unit) = signed.chars().last() else {
        return Err(FORMAT_MSG.to_string());
    };
    if !valid_units.contains(&unit) {
        let list = valid_units
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!("must end with one of: {list}"));
    }

    let inner = &signed[1..signed.len() - unit.len_utf8()];
    let Some((min, max)) = get_range(inner) else {
        return Err(FORMAT_MSG.to_string());
    };

    if min == -1 {
        let amount = if negative { -max } else { max };
        return Ok(get_adjusted(date, amount, unit));
    }

    let (min, max) = if negative { (-min, -max) } else { (min, max) };
    let min_date = get_adjusted(date, min, unit);
    let diff_millis = (get_adjusted(date, max, unit) - min_date).num_milliseconds() as f64;
    let adjust_millis = rng.random::<f64>() * diff_millis;
    Ok(min_date + Duration::milliseconds(adjust_millis as i64))
}

/// Resolves an attribute reference relative to the calling attribute's
/// parent. A leading `~` on the name is accepted and ignored.
fn get_ref_value(name: &str, ctx: &mut FuncContext<'_>) -> Result<ResolvedValue, String> {
    let name = match name.strip_prefix('~') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    };
    let full = format!("{}.{name}", ctx.parent);

    let entity = ctx
        .resolver
        .find_entity(&full)
        .map_err(|_| format!("references unknown attribute '{full}'"))?;

    let EntityKind::Scalar { ty, template } = &entity.kind else {
        return Err(format!(
            "references unresolvable attribute '{full}': not a value attribute"
        ));
    };

    let mut resolved = ResolvedValue::new(Some(full.clone()), *ty, template.clone());
    ctx.resolver
        .resolve(&mut resolved, &mut *ctx.cache, &mut *ctx.rng)
        .map_err(|e| format!("references unresolvable attribute '{full}': {e}"))?;

    Ok(resolved)
}

#[derive(Debug, Clone)]
enum Operand {
    Num(f64),
    Text(String),
}

/// Parses `'op'value` (e.g. `>4`, `+2.45`, `=Blah`, `<~attr`) into the
/// operator and its operand. References are resolved; numeric operands
/// are detected by parsing.
fn get_op(
    arg: &str,
    valid_ops: &[char],
    ctx: &mut FuncContext<'_>,
) -> Result<(char, Operand), String> {
    if arg.len() < 2 {
        return Err("must be in format 'op'num, e.g. >-4".to_string());
    }

    let mut chars = arg.chars();
    let Some(op) = chars.next() else {
        return Err("must be in format 'op'num, e.g. >-4".to_string());
    };
    let mut operand = chars.as_str().to_string();

    if !valid_ops.contains(&op) {
        let list = valid_ops
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!("must start with one of: {list}"));
    }

    if operand.starts_with('~') {
        let resolved = get_ref_value(&operand, ctx)?;
        operand = resolved.value().unwrap_or_default().to_string();
    }

    match operand.parse::<f64>() {
        Ok(num) => Ok((op, Operand::Num(num))),
        Err(_) => Ok((op, Operand::Text(operand))),
    }
}

struct StrFn;

impl TemplateFn for StrFn {
    fn name(&self) -> &'static str {
        "STR"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.str(arg1, [arg2]) where arg1 is the number of chars to generate or \
         min-max number of chars to generate, e.g. func.str(4-6) and arg2 is cap, upper, \
         lower (default) or mixed where cap = first letter only is upper case."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        #[derive(PartialEq)]
        enum Case {
            Cap,
            Upper,
            Lower,
            Mixed,
        }

        let case = match args.len() {
            1 => Case::Lower,
            2 => match args[1].to_ascii_uppercase().as_str() {
                "CAP" => Case::Cap,
                "UPPER" => Case::Upper,
                "LOWER" => Case::Lower,
                "MIXED" => Case::Mixed,
                _ => {
                    return Err(arg_error(
                        called,
                        "str",
                        "arg2 must be one of: CAP, UPPER, LOWER, MIXED",
                    ));
                }
            },
            _ => return Err(arg_error(called, "str", "has bad number of arguments")),
        };

        // Here a single number means an exact length, not a maximum.
        let parts: Vec<&str> = args[0].split('-').collect();
        let range = match parts.as_slice() {
            [n] => n.trim().parse::<i64>().map(|n| (n, n)).ok(),
            [lo, hi] => lo
                .trim()
                .parse::<i64>()
                .ok()
                .zip(hi.trim().parse::<i64>().ok()),
            _ => None,
        };
        let Some((min, max)) = range.filter(|(min, max)| min <= max) else {
            return Err(arg_error(
                called,
                "str",
                "first argument must be a number or a range",
            ));
        };

        let len = ctx.rng.random_range(min..=max);
        let mut out = String::new();
        for i in 0..len.max(0) {
            let c = match case {
                Case::Upper => random_upper(ctx.rng),
                Case::Cap if i == 0 => random_upper(ctx.rng),
                Case::Cap | Case::Lower => random_lower(ctx.rng),
                Case::Mixed => {
                    if ctx.rng.random_bool(0.5) {
                        random_upper(ctx.rng)
                    } else {
                        random_lower(ctx.rng)
                    }
                }
            };
            out.push(c);
        }

        Ok(FuncValue::neutral(out))
    }
}

struct NumFn;

impl TemplateFn for NumFn {
    fn name(&self) -> &'static str {
        "NUM"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.num(arg1, [arg2]) where arg1 is either the number of digits to \
         generate, min-max number of digits to generate or an attribute name (if \
         preceded by '~') and arg2 is the required number of decimal places with \
         optional t suffix to truncate or r suffix to round."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() || args.len() > 2 {
            return Err(arg_error(called, "num", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "num", "has empty argument"));
        }

        if let Some(name) = args[0].strip_prefix('~') {
            let resolved = get_ref_value(&args[0], ctx).map_err(|e| plain_error(called, e))?;
            let raw = resolved.value().unwrap_or_default();
            let mut value: f64 = raw.parse().map_err(|_| {
                arg_error(
                    called,
                    "num",
                    format!("attribute {name} value {raw} is not a number"),
                )
            })?;

            if args.len() == 2 && !apply_decimal_places(&args[1], &mut value) {
                return Err(arg_error(
                    called,
                    "num",
                    "second argument must be the required number of decimal places \
                     with a t or r suffix",
                ));
            }

            return Ok(FuncValue::neutral(format_num(value)));
        }

        let Some((min, max)) = get_range(&args[0]) else {
            return Err(arg_error(
                called,
                "num",
                "first argument must be a number or a range",
            ));
        };

        let num_len = if min == -1 {
            max
        } else if min <= max {
            ctx.rng.random_range(min..=max)
        } else {
            return Err(arg_error(
                called,
                "num",
                "first argument must be a number or a range",
            ));
        };

        let mut out = String::new();
        for i in 0..num_len.max(0) {
            if i == 0 {
                out.push((b'1' + ctx.rng.random_range(0..9u8)) as char);
            } else {
                out.push(random_digit(ctx.rng));
            }
        }

        if args.len() == 2 && !add_decimal_places(&args[1], &mut out, ctx.rng) {
            return Err(arg_error(
                called,
                "num",
                "second argument must be the required number of decimal places",
            ));
        }

        Ok(FuncValue::neutral(out))
    }
}

struct DateFn;

impl TemplateFn for DateFn {
    fn name(&self) -> &'static str {
        "DATE"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.date(arg1, [arg2], [arg3]) where arg1 is either NOW or a date in \
         format yyyy-mm-dd [hh:mm:ss] and arg2 is an amount to adjust the date by, \
         e.g. -5d to subtract 5 days, +1y to add 1 year etc. (may be left blank if you \
         just want to format a date) and arg3 is a strftime format for the date, e.g. \
         %d/%m/%Y (only works if attribute type is STR as DATE type is always in ISO \
         format). For arg2 you can also specify a range to add or subtract (includes \
         fractions of the specified unit), e.g. NOW, -18-102y will give you a random \
         date of birth for somebody between 18 and 102 years old. For arg3 you can \
         specify 'epoch' if you want the Unix epoch time of the date."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() || args.len() > 3 {
            return Err(arg_error(called, "date", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "date", "has empty argument"));
        }

        let mut date = start_date(called, "date", &args[0])?;

        if args.len() > 1 && !args[1].is_empty() {
            date = adjust_date(date, &args[1], &['y', 'M', 'd', 'H', 'm', 's'], ctx.rng)
                .map_err(|e| arg_error(called, "date", format!("second argument {e}")))?;
        }

        if args.len() == 3 {
            if args[2].eq_ignore_ascii_case("epoch") {
                return Ok(FuncValue::neutral(date.and_utc().timestamp().to_string()));
            }
            let formatted = format_date(date, &args[2]).ok_or_else(|| {
                plain_error(called, format!("has bad date format: {}", args[2]))
            })?;
            return Ok(FuncValue::neutral(formatted));
        }

        Ok(FuncValue::neutral(
            date.format("%Y-%m-%dT%H:%M:%S").to_string(),
        ))
    }
}

struct TimeFn;

impl TemplateFn for TimeFn {
    fn name(&self) -> &'static str {
        "TIME"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.time(arg1, [arg2], [arg3]) where arg1 is either NOW or a time in \
         format hh:mm[:ss] (or as a full date) and arg2 is an amount to adjust the time \
         by, e.g. -5H to subtract 5 hours, +1m to add 1 minute etc. (may be left blank \
         if you just want to format a time) and arg3 is a strftime format for the time \
         (attribute type must be STR). You can also specify a range to add or subtract, \
         e.g. -0-24H will subtract anywhere between 0 and 24 hours including fractions \
         of hours."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() || args.len() > 3 {
            return Err(arg_error(called, "time", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "time", "has empty argument"));
        }

        let mut date = start_date(called, "time", &args[0])?;

        if args.len() > 1 && !args[1].is_empty() {
            date = adjust_date(date, &args[1], &['H', 'm', 's'], ctx.rng)
                .map_err(|e| arg_error(called, "time", format!("second argument {e}")))?;
        }

        if args.len() == 3 {
            let formatted = format_date(date, &args[2]).ok_or_else(|| {
                plain_error(called, format!("has bad time format: {}", args[2]))
            })?;
            return Ok(FuncValue::neutral(formatted));
        }

        Ok(FuncValue::neutral(date.format("%H:%M:%S").to_string()))
    }
}

struct GenFn;

impl TemplateFn for GenFn {
    fn name(&self) -> &'static str {
        "GEN"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.gen(arg) where arg is either UUID or a string of chars where # will \
         be replaced by a random digit, ^ will be replaced by a random uppercase letter, \
         @ will be replaced by a random lowercase letter and * will be replaced by a \
         random mixed case letter. Any other chars are treated as literals and will be \
         retained."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() {
            return Err(arg_error(called, "gen", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "gen", "has empty argument"));
        }

        // Only one argument is expected but commas are allowed inside
        // the pattern, so the split args are joined back together.
        let pattern = args.join(",");

        if pattern.eq_ignore_ascii_case("UUID") {
            return Ok(FuncValue::neutral(random_uuid(ctx.rng).to_string()));
        }

        let mut out = String::with_capacity(pattern.len());
        for c in pattern.chars() {
            match c {
                '#' => out.push(random_digit(ctx.rng)),
                '^' => out.push(random_upper(ctx.rng)),
                '@' => out.push(random_lower(ctx.rng)),
                '*' => {
                    if ctx.rng.random_bool(0.5) {
                        out.push(random_upper(ctx.rng));
                    } else {
                        out.push(random_lower(ctx.rng));
                    }
                }
                c => out.push(c),
            }
        }

        Ok(FuncValue::neutral(out))
    }
}

struct RandFn;

impl TemplateFn for RandFn {
    fn name(&self) -> &'static str {
        "RAND"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.rand(arg1, [arg2]) where arg1 is a number, e.g. func.rand(4) to \
         generate a number between 0 and 3 or arg1 is a range, e.g. func.rand(1-3) to \
         generate a number between 1 and 3. Arg2 is the required number of decimal \
         places."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() || args.len() > 2 {
            return Err(arg_error(called, "rand", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "rand", "has empty argument"));
        }

        let range_err = || {
            arg_error(
                called,
                "rand",
                "first argument must be a number or a range",
            )
        };

        let Some((min, max)) = get_range(&args[0]) else {
            return Err(range_err());
        };

        let num = if min == -1 {
            // Single argument N means 0..N-1.
            if max <= 0 {
                return Err(range_err());
            }
            ctx.rng.random_range(0..max)
        } else if min <= max {
            ctx.rng.random_range(min..=max)
        } else {
            return Err(range_err());
        };

        let mut out = num.to_string();
        if args.len() == 2 && !add_decimal_places(&args[1], &mut out, ctx.rng) {
            return Err(arg_error(
                called,
                "rand",
                "second argument must be the required number of decimal places",
            ));
        }

        Ok(FuncValue::neutral(out))
    }
}

struct PickFn;

impl TemplateFn for PickFn {
    fn name(&self) -> &'static str {
        "PICK"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.pick(arg1, arg2, [arg3], ...) where one of the arguments is chosen \
         at random."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() {
            return Err(arg_error(called, "pick", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "pick", "has empty argument"));
        }

        let choice = ctx.rng.random_range(0..args.len());
        Ok(FuncValue::neutral(args[choice].clone()))
    }
}

struct SampleFn;

impl TemplateFn for SampleFn {
    fn name(&self) -> &'static str {
        "SAMPLE"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.sample(arg1, [arg2]) where arg1 is the name of the samples file to \
         use and arg2 is either another attribute to take the gender from, or M or F to \
         use a fixed gender."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.is_empty() || args.len() > 2 {
            return Err(arg_error(called, "sample", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "sample", "has empty argument"));
        }

        let mut gender = Gender::Neutral;
        if args.len() == 2 {
            gender = match Gender::parse(&args[1]) {
                Some(gender) => gender,
                None => {
                    // Inherit gender from a sibling attribute.
                    let resolved =
                        get_ref_value(&args[1], ctx).map_err(|e| plain_error(called, e))?;
                    resolved.gender()
                }
            };
        }

        let samples = ctx.resolver.samples(&args[0])?;
        let sample = samples
            .pick(gender, ctx.rng)
            .map_err(|e| plain_error(called, e.to_string()))?;

        Ok(FuncValue {
            value: sample.value.clone(),
            gender: sample.gender,
        })
    }
}

struct RefFn;

impl TemplateFn for RefFn {
    fn name(&self) -> &'static str {
        "REF"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.ref(arg) where arg is another attribute to take the value from."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.len() != 1 {
            return Err(arg_error(called, "ref", "has bad number of arguments"));
        }
        if args[0].is_empty() {
            return Err(arg_error(called, "ref", "has empty argument"));
        }

        let resolved = get_ref_value(&args[0], ctx)
            .map_err(|e| arg_error(called, "ref", e))?;

        Ok(FuncValue {
            value: resolved.value().unwrap_or_default().to_string(),
            gender: resolved.gender(),
        })
    }
}

struct IfFn;

impl TemplateFn for IfFn {
    fn name(&self) -> &'static str {
        "IF"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.if(arg1, arg2, arg3, arg4) where arg1=value1, arg2='op'value2 \
         (where op is <, > or =), arg3=returned value if value1'op'value2 is true and \
         arg4=returned value if value1'op'value2 is false. Value1 and value2 may be \
         positive or negative numbers, strings or attribute names (if preceded by '~')."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.len() != 4 {
            return Err(arg_error(called, "if", "has bad number of arguments"));
        }
        if args[0].is_empty() || args[1].is_empty() {
            return Err(arg_error(called, "if", "has empty argument"));
        }

        let (_, val1) = get_op(&format!("+{}", args[0]), &['+'], ctx)
            .map_err(|e| plain_error(called, e))?;
        let (op, val2) = get_op(&args[1], &['>', '<', '='], ctx)
            .map_err(|e| arg_error(called, "if", format!("second argument {e}")))?;

        let passed = match (&val1, &val2) {
            (Operand::Num(a), Operand::Num(b)) => match op {
                '>' => a > b,
                '<' => a < b,
                _ => a == b,
            },
            _ => {
                let a = match &val1 {
                    Operand::Text(s) => s.clone(),
                    Operand::Num(n) => format_num(*n),
                };
                let b = match &val2 {
                    Operand::Text(s) => s.clone(),
                    Operand::Num(n) => format_num(*n),
                };
                match op {
                    '>' => a > b,
                    '<' => a < b,
                    _ => a == b,
                }
            }
        };

        let result = if passed { &args[2] } else { &args[3] };
        Ok(FuncValue::neutral(result.clone()))
    }
}

struct MathFn;

impl TemplateFn for MathFn {
    fn name(&self) -> &'static str {
        "MATH"
    }

    fn usage(&self) -> &'static str {
        "Usage: func.math(arg1, arg2, [arg3], ...) where arg1=value1, arg2='op'value2 \
         (where op is +, -, * or /), all further args in same format as arg2. Values \
         may be positive or negative numbers or attribute names (if preceded by '~'). \
         Operations are applied left to right."
    }

    fn call(
        &self,
        called: &str,
        args: &[String],
        ctx: &mut FuncContext<'_>,
    ) -> EngineResult<FuncValue> {
        if args.len() < 2 {
            return Err(arg_error(called, "math", "has bad number of arguments"));
        }

        let mut total = 0.0f64;
        for (i, raw) in args.iter().enumerate() {
            if raw.is_empty() {
                return Err(arg_error(called, "math", "has empty argument"));
            }

            let arg = if i == 0 {
                format!("+{raw}")
            } else {
                raw.clone()
            };

            let (op, operand) = get_op(&arg, &['+', '-', '*', '/'], ctx)
                .map_err(|e| arg_error(called, "math", format!("argument {} {e}", i + 1)))?;

            let Operand::Num(value) = operand else {
                return Err(arg_error(
                    called,
                    "math",
                    format!("argument {} cannot be resolved to a number", i + 1),
                ));
            };

            match op {
                '+' => total += value,
                '-' => total -= value,
                '*' => total *= value,
                _ => total /= value,
            }
        }

        Ok(FuncValue::neutral(format_num(total)))
    }
}
