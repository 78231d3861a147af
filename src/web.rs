//! Minimal demo HTTP front end over the KV facade — a thin, deliberately
//! unauthenticated consumer standing in for the application-service layer
//! spec.md §1 excludes from scope. Grounded on the teacher's
//! `threads/web.rs` (`actix-web` + `tera`, GET/PUT via query params).

use std::sync::Arc;

use actix_web::web::{Data, Query};
use actix_web::{get, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use tera::{Context, Tera};

use crate::core::ChordNode;

const TEMPLATE: &str = r#"
<!doctype html>
<html><head><title>{{ title }}</title></head>
<body>
  <h1>{{ title }}</h1>
  <p>node id: {{ node_id }}</p>
  <form method="get">
    <input name="key" placeholder="key">
    <button type="submit" name="action" value="get">Get</button>
  </form>
  <form method="get">
    <input name="key" placeholder="key">
    <input name="value" placeholder="value">
    <button type="submit" name="action" value="put">Put</button>
  </form>
  {% if status %}<p>status: {{ status }}</p>{% endif %}
  {% if result %}<pre>{{ result }}</pre>{% endif %}
</body></html>
"#;

#[derive(Deserialize)]
struct QueryParams {
    action: Option<String>,
    key: Option<String>,
    value: Option<String>,
}

#[get("/")]
async fn index(node: Data<Arc<ChordNode>>, query: Query<QueryParams>) -> impl Responder {
    let mut context = Context::new();
    context.insert("title", "ringtalk");
    context.insert("node_id", &node.id().to_string());

    match (query.action.as_deref(), &query.key, &query.value) {
        (Some("get"), Some(key), _) => {
            let value = node.get_key(key).await;
            if value.is_empty() {
                context.insert("status", "NOT_FOUND");
            } else {
                context.insert("status", "OK");
                context.insert("result", &String::from_utf8_lossy(&value).to_string());
            }
        }
        (Some("put"), Some(key), Some(value)) => {
            let ok = node.set_key(key, value.clone().into_bytes()).await;
            context.insert("status", if ok { "OK" } else { "FAILED" });
        }
        _ => {}
    }

    let rendered = Tera::one_off(TEMPLATE, &context, true).unwrap_or_else(|e| format!("template error: {}", e));
    HttpResponse::Ok().content_type("text/html").body(rendered)
}

pub async fn serve(node: Arc<ChordNode>) -> std::io::Result<()> {
    let port = node.config.http_port;
    log::info!("web UI listening on 0.0.0.0:{}", port);
    HttpServer::new(move || App::new().app_data(Data::new(Arc::clone(&node))).service(index))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
