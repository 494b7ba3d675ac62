use boa_engine::{Context, JsValue, Source};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::{InterpreterError, InterpreterResult, JavascriptInterpreter};

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());

/// Interpreter backed by the Boa engine.
///
/// Every call gets a fresh [`Context`] seeded with a minimal browser shim:
/// `location`, `document.getElementById` and an immediate `setTimeout`.
/// Element values are kept in `__fields` so the answer can be read back.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoaJavascriptInterpreter;

impl BoaJavascriptInterpreter {
    pub fn new() -> Self {
        Self
    }

    fn inline_scripts(page_html: &str) -> Vec<String> {
        let document = Html::parse_document(page_html);
        document
            .select(&SCRIPT)
            .filter(|script| script.value().attr("src").is_none())
            .map(|script| script.text().collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .collect()
    }

    fn browser_shim(host: &str) -> String {
        let host = host.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            r#"
var __fields = {{}};
var location = {{ href: "https://{host}/", hostname: "{host}", protocol: "https:", port: "" }};
var navigator = {{ userAgent: "Mozilla/5.0", language: "en-US", platform: "Linux x86_64" }};
function __element(id) {{
    var el = {{
        id: id,
        style: {{}},
        submit: function() {{}},
        setAttribute: function() {{}},
        addEventListener: function() {{}},
        appendChild: function(child) {{ return child; }}
    }};
    Object.defineProperty(el, "value", {{
        get: function() {{ return __fields[id]; }},
        set: function(v) {{ __fields[id] = v; }}
    }});
    Object.defineProperty(el, "innerHTML", {{
        get: function() {{ return this._html || ""; }},
        set: function(v) {{
            this._html = v;
            var m = /href\s*=\s*['"]([^'"]+)['"]/i.exec(v || "");
            this.firstChild = {{ href: m ? "https://{host}" + m[1].replace(/^https?:\/\/[^\/]+/, "") : "" }};
        }}
    }});
    return el;
}}
var __elements = {{}};
var document = {{
    location: location,
    createElement: function(tag) {{ return __element(tag); }},
    getElementById: function(id) {{
        if (!__elements[id]) {{ __elements[id] = __element(id); }}
        return __elements[id];
    }}
}};
document.getElementById("challenge-form").elements = {{
    namedItem: function(name) {{ return document.getElementById(name); }}
}};
var window = {{ location: location, navigator: navigator, document: document }};
function setTimeout(cb) {{ cb(); return 0; }}
function clearTimeout() {{}}
"#
        )
    }

    fn eval(context: &mut Context, code: &str) -> InterpreterResult<JsValue> {
        context
            .eval(Source::from_bytes(code))
            .map_err(|err| InterpreterError::Execution(err.to_string()))
    }

    fn answer(context: &mut Context) -> InterpreterResult<String> {
        let value = Self::eval(context, "__fields['jschl_answer']")?;
        if value.is_null() || value.is_undefined() {
            return Err(InterpreterError::NoAnswer);
        }

        if let Ok(number) = value.to_number(context)
            && number.is_finite()
        {
            return Ok(format!("{number:.10}"));
        }

        value
            .to_string(context)
            .map_err(|err| InterpreterError::Execution(err.to_string()))?
            .to_std_string()
            .map_err(|err| InterpreterError::Execution(err.to_string()))
    }
}

impl JavascriptInterpreter for BoaJavascriptInterpreter {
    fn solve_challenge(&self, page_html: &str, host: &str) -> InterpreterResult<String> {
        let scripts = Self::inline_scripts(page_html);
        if scripts.is_empty() {
            return Err(InterpreterError::NoScript);
        }

        let mut context = Context::default();
        Self::eval(&mut context, &Self::browser_shim(host))?;
        for script in &scripts {
            Self::eval(&mut context, script)?;
        }

        Self::answer(&mut context)
    }
}
