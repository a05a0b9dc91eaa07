use axum::response::Html;

use crate::chat::Conversation;
use crate::markdown::{STYLESHEET, render_conversation};

const APP_JS: &str = include_str!("app.js");

const MARKED_JS: &str = "https://cdn.jsdelivr.net/npm/marked@12.0.2/marked.min.js";
const PURIFY_JS: &str = "https://cdn.jsdelivr.net/npm/dompurify@3.1.6/dist/purify.min.js";

/// The browser page: an HTML shell around the client script.
pub fn index_html() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>duochat</title>
<style>
{STYLESHEET}</style>
<script src="{MARKED_JS}"></script>
<script src="{PURIFY_JS}"></script>
</head>
<body>
<main>
<div id="conversation">
{conversation}</div>
<p id="error" role="status"></p>
</main>
<form id="composer" autocomplete="off">
<input id="input" name="input" placeholder="Digite uma mensagem ou /img prompt" autofocus>
<span id="art-badge" class="art-badge" hidden>ART</span>
<button id="send" type="submit">Enviar</button>
</form>
<script>
{APP_JS}</script>
</body>
</html>
"#,
        conversation = render_conversation(&Conversation::new(), false),
    )
}

pub(crate) async fn index() -> Html<String> {
    Html(index_html())
}
