//! Native host bindings exposed to sandboxed JavaScript.
//!
//! Logger output goes to the [`LogSink`] installed for the current worker
//! thread; calendar helpers exchange timestamps as epoch milliseconds.

use std::cell::RefCell;
use std::fmt::Write as _;

use boa_engine::object::ObjectInitializer;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsValue, NativeFunction};
use chrono::{NaiveDateTime, Utc, Weekday};
use seedforge_types::calendar::{self, Period};
use seedforge_types::{query, Binding, LogLevel, LogSink, DEFAULT_DATE_FORMAT};

thread_local! {
    static ACTIVE_SINK: RefCell<Option<LogSink>> = const { RefCell::new(None) };
}

/// Keeps a job's sink installed on this thread until dropped.
pub(crate) struct SinkGuard;

impl SinkGuard {
    pub(crate) fn install(sink: LogSink) -> Self {
        ACTIVE_SINK.with(|slot| *slot.borrow_mut() = Some(sink));
        SinkGuard
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        ACTIVE_SINK.with(|slot| slot.borrow_mut().take());
    }
}

/// Convert a host binding into the value passed to the compiled function.
pub(crate) fn binding_value(binding: &Binding, context: &mut Context) -> JsResult<JsValue> {
    match binding {
        Binding::Logger => Ok(logger_object(context)),
        Binding::Calendar { now, week_start } => Ok(calendar_object(*now, *week_start, context)),
        Binding::Query => Ok(query_object(context)),
        Binding::Value(value) => JsValue::from_json(value, context),
    }
}

// ================================
// logger / console
// ================================

fn logger_object(context: &mut Context) -> JsValue {
    let mut initializer = ObjectInitializer::new(context);
    initializer
        .function(NativeFunction::from_fn_ptr(log_info), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(log_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(log_info), js_string!("debug"), 0)
        .function(NativeFunction::from_fn_ptr(log_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(log_error), js_string!("error"), 0);
    initializer.build().into()
}

fn log_info(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Info, args, ctx)
}

fn log_warn(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Warn, args, ctx)
}

fn log_error(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(LogLevel::Error, args, ctx)
}

fn emit(level: LogLevel, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = args
        .iter()
        .map(|arg| format_arg(arg, ctx))
        .collect::<Vec<_>>()
        .join(" ");
    ACTIVE_SINK.with(|slot| {
        if let Some(sink) = slot.borrow().as_ref() {
            sink.record(level, message);
        }
    });
    Ok(JsValue::undefined())
}

/// Strings verbatim, plain objects as JSON, errors as `Name: message`.
pub(crate) fn format_arg(value: &JsValue, ctx: &mut Context) -> String {
    if let Some(s) = value.as_string() {
        return s.to_std_string_escaped();
    }
    if let Some(obj) = value.as_object() {
        if !obj.is_callable() {
            let name = obj.get(js_string!("name"), ctx).ok();
            let message = obj.get(js_string!("message"), ctx).ok();
            if let (Some(name), Some(message)) = (
                name.as_ref().and_then(JsValue::as_string),
                message.as_ref().and_then(JsValue::as_string),
            ) {
                return format!(
                    "{}: {}",
                    name.to_std_string_escaped(),
                    message.to_std_string_escaped()
                );
            }
            if let Ok(json) = value.to_json(ctx) {
                return json.to_string();
            }
        }
    }
    value
        .to_string(ctx)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| value.display().to_string())
}

// ================================
// calendar
// ================================

fn calendar_object(now: Option<NaiveDateTime>, week_start: Weekday, context: &mut Context) -> JsValue {
    let pinned = now.map(calendar::to_epoch_millis);
    let now_fn = NativeFunction::from_copy_closure(move |_this, _args, _ctx| {
        let millis = pinned.unwrap_or_else(|| Utc::now().timestamp_millis());
        Ok(JsValue::from(millis as f64))
    });
    let start_of = NativeFunction::from_copy_closure(move |_this, args, ctx| {
        let at = arg_timestamp(args, 0, ctx)?;
        let period = arg_period(args, 1, ctx)?;
        Ok(millis_value(period.start_of(at, week_start)))
    });
    let end_of = NativeFunction::from_copy_closure(move |_this, args, ctx| {
        let at = arg_timestamp(args, 0, ctx)?;
        let period = arg_period(args, 1, ctx)?;
        let end = period.end_of(at, week_start).ok_or_else(out_of_range)?;
        Ok(millis_value(end))
    });

    let mut initializer = ObjectInitializer::new(context);
    initializer
        .function(now_fn, js_string!("now"), 0)
        .function(NativeFunction::from_fn_ptr(calendar_add), js_string!("add"), 3)
        .function(NativeFunction::from_fn_ptr(calendar_subtract), js_string!("subtract"), 3)
        .function(start_of, js_string!("startOf"), 2)
        .function(end_of, js_string!("endOf"), 2)
        .function(NativeFunction::from_fn_ptr(calendar_format), js_string!("format"), 2)
        .function(NativeFunction::from_fn_ptr(calendar_parse), js_string!("parse"), 1);
    initializer.build().into()
}

fn calendar_add(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    shift(args, ctx, 1)
}

fn calendar_subtract(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    shift(args, ctx, -1)
}

fn shift(args: &[JsValue], ctx: &mut Context, sign: i64) -> JsResult<JsValue> {
    let at = arg_timestamp(args, 0, ctx)?;
    let amount = arg_integer(args, 1, ctx)?;
    let period = arg_period(args, 2, ctx)?;
    let moved = amount
        .checked_mul(sign)
        .and_then(|n| period.shift(at, n))
        .ok_or_else(out_of_range)?;
    Ok(millis_value(moved))
}

fn calendar_format(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let at = arg_timestamp(args, 0, ctx)?;
    let pattern = match args.get(1) {
        Some(v) if !v.is_undefined() => v.to_string(ctx)?.to_std_string_escaped(),
        _ => DEFAULT_DATE_FORMAT.to_string(),
    };
    let items = chrono::format::StrftimeItems::new(&pattern);
    let mut formatted = String::new();
    write!(formatted, "{}", at.format_with_items(items)).map_err(|_| {
        JsNativeError::typ().with_message(format!("invalid date format '{pattern}'"))
    })?;
    Ok(JsValue::from(js_string!(formatted)))
}

fn calendar_parse(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let text = args
        .first()
        .cloned()
        .unwrap_or_else(JsValue::undefined)
        .to_string(ctx)?
        .to_std_string_escaped();
    let at = calendar::parse_timestamp(&text).ok_or_else(|| {
        JsNativeError::typ().with_message(format!("cannot parse date '{text}'"))
    })?;
    Ok(millis_value(at))
}

fn millis_value(at: NaiveDateTime) -> JsValue {
    JsValue::from(calendar::to_epoch_millis(at) as f64)
}

fn out_of_range() -> boa_engine::JsError {
    JsNativeError::range()
        .with_message("date out of range")
        .into()
}

fn arg_timestamp(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<NaiveDateTime> {
    let millis = args.get(index).cloned().unwrap_or_else(JsValue::undefined).to_number(ctx)?;
    if !millis.is_finite() {
        return Err(JsNativeError::typ()
            .with_message("expected a timestamp in epoch milliseconds")
            .into());
    }
    calendar::from_epoch_millis(millis as i64).ok_or_else(out_of_range)
}

fn arg_integer(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<i64> {
    let n = args.get(index).cloned().unwrap_or_else(JsValue::undefined).to_number(ctx)?;
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(JsNativeError::typ()
            .with_message("expected an integer amount")
            .into());
    }
    Ok(n as i64)
}

fn arg_period(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<Period> {
    let name = args
        .get(index)
        .cloned()
        .unwrap_or_else(JsValue::undefined)
        .to_string(ctx)?
        .to_std_string_escaped();
    name.parse::<Period>()
        .map_err(|e| JsNativeError::typ().with_message(e.to_string()).into())
}

// ================================
// query
// ================================

fn query_object(context: &mut Context) -> JsValue {
    let mut initializer = ObjectInitializer::new(context);
    initializer.function(NativeFunction::from_fn_ptr(query_encode), js_string!("encode"), 2);
    initializer.build().into()
}

/// `query.encode(params, skipKeys?)`: form-urlencode an object's entries.
fn query_encode(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let params = match args.first() {
        Some(v) if v.is_object() => v.to_json(ctx)?,
        _ => serde_json::Value::Null,
    };
    let skip: Vec<String> = match args.get(1) {
        Some(v) if v.is_object() => v
            .to_json(ctx)?
            .as_array()
            .map(|keys| keys.iter().map(query::param_value).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    let encoded = query::encode_object(&params, &skip);
    Ok(JsValue::from(js_string!(encoded)))
}
