//! The standard action catalogue.
//!
//! Each `define_action_*` builder fixes the name, alias and parameter schema of one
//! standard action and forwards the typed parameters to the device-supplied `call`.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::action::{ActionCall, ActionContext, ActionDescriptor};
use crate::errors::{ScriptError, ScriptResult};
use crate::schema::{stringify_scalar, Field, Schema};
use crate::swipe::{Point, SwipeDirection, SwipeGesture};

/// Parameters of actions that only need a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLocateParam {
    pub locate: Value,
}

pub type ActionTapParam = ActionLocateParam;
pub type ActionRightClickParam = ActionLocateParam;
pub type ActionDoubleClickParam = ActionLocateParam;
pub type ActionHoverParam = ActionLocateParam;
pub type ActionClearInputParam = ActionLocateParam;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputMode {
    Replace,
    Clear,
    TypeOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInputParam {
    pub value: String,
    #[serde(default)]
    pub locate: Option<Value>,
    pub mode: InputMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionKeyboardPressParam {
    #[serde(default)]
    pub locate: Option<Value>,
    pub key_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollType {
    SingleAction,
    ScrollToBottom,
    ScrollToTop,
    ScrollToRight,
    ScrollToLeft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionScrollParam {
    pub direction: SwipeDirection,
    pub scroll_type: ScrollType,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub locate: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDragAndDropParam {
    pub from: Value,
    pub to: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLongPressParam {
    pub locate: Value,
    #[serde(default = "default_long_press_ms")]
    pub duration: u64,
}

fn default_long_press_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSwipeParam {
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    #[serde(default)]
    pub direction: Option<SwipeDirection>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub repeat: Option<u32>,
}

impl ActionSwipeParam {
    /// Convert to a gesture, reading points from the resolved start/end targets.
    ///
    /// A start or end that is present but not a point (an unresolved locate prompt, for
    /// instance) is an error rather than a fallback to the defaults.
    pub fn to_gesture(&self) -> ScriptResult<SwipeGesture> {
        Ok(SwipeGesture {
            start: resolved_point(self.start.as_ref(), "start")?,
            end: resolved_point(self.end.as_ref(), "end")?,
            direction: self.direction,
            distance: self.distance,
            duration: self.duration,
            repeat: self.repeat,
        })
    }
}

fn resolved_point(value: Option<&Value>, which: &str) -> ScriptResult<Option<Point>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Point::from_value(v).map(Some).ok_or_else(|| {
            ScriptError::InvalidSwipe(format!("{which} must be resolved to a point, but got {v}"))
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCursorMoveParam {
    pub direction: CursorDirection,
    pub times: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSleepParam {
    pub time_ms: u64,
}

fn direction_schema() -> Schema {
    Schema::enumeration(["up", "down", "left", "right"])
}

fn locate_only_schema(description: &str) -> Schema {
    Schema::object([Field::locator("locate").describe(description)])
}

/// Wrap a typed device call: parameters are deserialized, the result serialized.
fn typed_call<P, R, F, Fut>(rewrite: fn(Value) -> Value, call: F) -> ActionCall
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize,
    F: Fn(P, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let call = Arc::new(call);
    Arc::new(move |param: Value, ctx: ActionContext| {
        let call = Arc::clone(&call);
        async move {
            let typed: P = serde_json::from_value(rewrite(param))?;
            let result = call(typed, ctx).await?;
            Ok::<Value, anyhow::Error>(serde_json::to_value(result)?)
        }
        .boxed()
    })
}

fn unchanged(param: Value) -> Value {
    param
}

fn standard(
    name: &str,
    alias: Option<&str>,
    description: &str,
    schema: Schema,
    call: ActionCall,
) -> ActionDescriptor {
    ActionDescriptor::from_parts(
        name,
        alias.map(str::to_string),
        description,
        Some(schema),
        call,
    )
}

macro_rules! locate_only_action {
    ($fn_name:ident, $param:ty, $name:literal, $alias:literal, $description:literal, $field_doc:literal) => {
        pub fn $fn_name<R, F, Fut>(call: F) -> ActionDescriptor
        where
            R: Serialize,
            F: Fn($param, ActionContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        {
            standard(
                $name,
                Some($alias),
                $description,
                locate_only_schema($field_doc),
                typed_call(unchanged, call),
            )
        }
    };
}

locate_only_action!(
    define_action_tap,
    ActionTapParam,
    "Tap",
    "aiTap",
    "Tap the element",
    "The element to be tapped"
);
locate_only_action!(
    define_action_right_click,
    ActionRightClickParam,
    "RightClick",
    "aiRightClick",
    "Right click the element",
    "The element to be right clicked"
);
locate_only_action!(
    define_action_double_click,
    ActionDoubleClickParam,
    "DoubleClick",
    "aiDoubleClick",
    "Double click the element",
    "The element to be double clicked"
);
locate_only_action!(
    define_action_hover,
    ActionHoverParam,
    "Hover",
    "aiHover",
    "Move the mouse to the element",
    "The element to be hovered"
);
locate_only_action!(
    define_action_clear_input,
    ActionClearInputParam,
    "ClearInput",
    "aiClearInput",
    "Clear the text of an input field",
    "The input field to be cleared"
);

/// Rewrite the deprecated `mode: append` to `typeOnly`.
fn rewrite_input_mode(mut param: Value) -> Value {
    if let Some(mode) = param.get_mut("mode") {
        if mode == "append" {
            *mode = json!("typeOnly");
        }
    }
    param
}

pub fn define_action_input<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionInputParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::new("value", Schema::string().preprocess(stringify_scalar))
            .describe("The value to be input"),
        Field::locator("locate")
            .describe("The element to be input")
            .optional(),
        Field::new(
            "mode",
            Schema::enumeration(["replace", "clear", "typeOnly", "append"])
                .default_value(json!("replace")),
        )
        .describe("Input mode: replace the content, clear it, or type without clearing"),
    ]);
    standard(
        "Input",
        Some("aiInput"),
        "Input the value into the element",
        schema,
        typed_call(rewrite_input_mode, call),
    )
}

pub fn define_action_keyboard_press<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionKeyboardPressParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::locator("locate")
            .describe("The element to be clicked before pressing the key")
            .optional(),
        Field::new("keyName", Schema::string()).describe("The key to be pressed"),
    ]);
    standard(
        "KeyboardPress",
        Some("aiKeyboardPress"),
        "Press a function key, like \"Enter\", \"Tab\", \"Escape\". Do not use this to type text.",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_scroll<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionScrollParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::new("direction", direction_schema().default_value(json!("down")))
            .describe("The direction to scroll"),
        Field::new(
            "scrollType",
            Schema::enumeration([
                "singleAction",
                "scrollToBottom",
                "scrollToTop",
                "scrollToRight",
                "scrollToLeft",
            ])
            .default_value(json!("singleAction")),
        )
        .describe("The scroll type"),
        Field::new("distance", Schema::number().nullable().optional())
            .describe("The distance in pixels to scroll"),
        Field::locator("locate")
            .describe("The element to be scrolled")
            .optional(),
    ]);
    standard(
        "Scroll",
        Some("aiScroll"),
        "Scroll the page or an element. Defaults to scrolling down once by a screen-dependent distance.",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_drag_and_drop<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionDragAndDropParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::locator("from").describe("The position to be dragged"),
        Field::locator("to").describe("The position to be dropped"),
    ]);
    standard(
        "DragAndDrop",
        Some("aiDragAndDrop"),
        "Drag and drop the element",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_long_press<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionLongPressParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::locator("locate").describe("The element to be long pressed"),
        Field::new("duration", Schema::integer().default_value(json!(500)))
            .describe("Press duration in milliseconds"),
    ]);
    standard(
        "LongPress",
        Some("aiLongPress"),
        "Long press the element",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_swipe<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionSwipeParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::locator("start")
            .describe("Where the swipe starts, defaults to the screen center")
            .optional(),
        Field::locator("end")
            .describe("Where the swipe ends")
            .optional(),
        Field::new("direction", direction_schema().optional())
            .describe("Swipe direction, required together with distance"),
        Field::new("distance", Schema::number().optional())
            .describe("Swipe distance in pixels"),
        Field::new("duration", Schema::integer().default_value(json!(300)))
            .describe("Swipe duration in milliseconds"),
        Field::new("repeat", Schema::integer().optional())
            .describe("How many times to swipe, 0 means keep swiping"),
    ]);
    standard(
        "Swipe",
        Some("aiSwipe"),
        "Perform a swipe gesture on a touch screen",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_cursor_move<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionCursorMoveParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([
        Field::new("direction", Schema::enumeration(["left", "right"]))
            .describe("The direction to move the text cursor"),
        Field::new("times", Schema::integer().default_value(json!(1)))
            .describe("How many characters to move"),
    ]);
    standard(
        "CursorMove",
        Some("aiCursorMove"),
        "Move the text cursor inside the focused input",
        schema,
        typed_call(unchanged, call),
    )
}

pub fn define_action_sleep<R, F, Fut>(call: F) -> ActionDescriptor
where
    R: Serialize,
    F: Fn(ActionSleepParam, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let schema = Schema::object([Field::new(
        "timeMs",
        Schema::integer().default_value(json!(1000)),
    )
    .describe("Milliseconds to wait")]);
    standard(
        "Sleep",
        None,
        "Wait for a number of milliseconds",
        schema,
        typed_call(unchanged, call),
    )
}
