//! `Eval`: a server-initiated bidi stream. The server writes an
//! `EvalRequest{id, code}` for every formula it wants evaluated against the
//! attached peer's own state and correlates the `EvalResponse{id, ...}` that
//! comes back on the same stream against a pending-promise table keyed by
//! `id` — see [`crate::service::ThalamusService::eval_on_remote`].
//!
//! The formula language itself is `thalamus-genicam`'s `expr::{Expr,
//! Scope}` — the same parser/evaluator that backs `SwissKnife`/`Converter`
//! register formulas — flattened here from the observable state tree's
//! numeric leaves so a request like `eval_on_remote("channels_0_gain * 2")`
//! has something to resolve variables against locally when the server is
//! itself the one answering (e.g. self-test / loopback callers).

use tonic::{Request, Response, Status, Streaming};

use thalamus_core::observable::ObservableDict;
use thalamus_core::Value;
use thalamus_genicam::expr::{Expr, Scope};
use thalamus_proto::{EvalRequest, EvalResponse};

use crate::service::ThalamusService;
use std::cell::RefCell;
use std::rc::Rc;

/// Flatten every numeric leaf under `root` into a `Scope`, turning its dict
/// address into a valid identifier by replacing `.`/`[`/`]` with `_` (an
/// address like `channels[0].gain` becomes the variable `channels_0_.gain`
/// -> `channels_0__gain`).
#[allow(dead_code)]
fn build_scope(root: &Rc<RefCell<ObservableDict>>) -> Scope {
    let mut scope = Scope::new();
    flatten_into(root, &mut scope);
    scope
}

fn sanitize(address: &str) -> String {
    address.chars().map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

fn flatten_into(dict: &Rc<RefCell<ObservableDict>>, scope: &mut Scope) {
    let entries: Vec<(String, Value)> = dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    for (key, value) in entries {
        match &value {
            Value::Dict(child) => flatten_into(child, scope),
            Value::Int(_) | Value::Double(_) | Value::Bool(_) => {
                let prefix = dict.borrow().address();
                let address = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                if let Some(v) = value.as_f64().or(value.as_bool().map(|b| b as i64 as f64)) {
                    scope.set(sanitize(&address), v);
                }
            }
            _ => {}
        }
    }
}

#[allow(dead_code)]
fn evaluate_code(root: &Rc<RefCell<ObservableDict>>, code: &str) -> EvalResponse {
    match Expr::parse(code).and_then(|expr| expr.eval(&build_scope(root))) {
        Ok(result) => EvalResponse { id: 0, json_result: serde_json::to_vec(&serde_json::json!(result)).unwrap_or_default(), error: String::new() },
        Err(e) => EvalResponse { id: 0, json_result: Vec::new(), error: e.to_string() },
    }
}

pub async fn handle_eval(
    service: &ThalamusService,
    request: Request<Streaming<EvalResponse>>,
) -> Result<Response<super::ResponseStream<EvalRequest>>, Status> {
    service.stats.inc_pending();
    let mut stream = request.into_inner();

    let (out_tx, out_rx) = tokio::sync::mpsc::channel(8);
    *service.eval_channel.out.lock().unwrap_or_else(|e| e.into_inner()) = Some(out_tx);

    let eval_channel = service.eval_channel.clone();
    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = stream.message() => {
                    match message {
                        Ok(Some(response)) => {
                            let pending = eval_channel.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&response.id);
                            if let Some(sender) = pending {
                                let _ = sender.send(response);
                            }
                        }
                        _ => break,
                    }
                }
            }
        }
        // This peer disconnected; drop the outbound sender if it's still ours
        // so a later `eval_on_remote` fails fast instead of hanging.
        let mut out = eval_channel.out.lock().unwrap_or_else(|e| e.into_inner());
        out.take();
    });

    service.stats.dec_pending();
    service.stats.inc_completed();
    Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(out_rx))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_numeric_leaves_into_sanitized_variable_names() {
        let root = ObservableDict::new();
        let channel = ObservableDict::new();
        channel.borrow_mut().set("gain", Value::Double(2.5));
        root.borrow_mut().set("channels", Value::Dict(channel));
        root.borrow_mut().set("offset", Value::Int(3));

        let scope = build_scope(&root);
        assert_eq!(scope.get("channels_gain").unwrap(), 2.5);
        assert_eq!(scope.get("offset").unwrap(), 3.0);
    }

    #[test]
    fn evaluate_code_reports_parse_errors_without_panicking() {
        let root = ObservableDict::new();
        let response = evaluate_code(&root, "1 +");
        assert!(!response.error.is_empty());
        assert!(response.json_result.is_empty());
    }
}
