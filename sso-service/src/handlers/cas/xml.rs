//! CAS v2/v3 response bodies.
//!
//! Built by string assembly; client libraries parse these with real XML
//! parsers, so only escaping and element structure matter, not whitespace.

use service_core::axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Minimal XML text escaping.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Successful `<cas:authenticationSuccess>` envelope.
///
/// `attributes` go into the v3 `<cas:attributes>` block and are omitted
/// entirely when empty; `proxies` lists callback URLs outermost first.
pub fn validation_success(
    username: &str,
    attributes: &[(String, String)],
    pgt_iou: Option<&str>,
    proxies: &[String],
) -> String {
    let mut body = String::new();
    body.push_str(
        "<cas:serviceResponse xmlns:cas=\"http://www.yale.edu/tp/cas\">\
         <cas:authenticationSuccess>",
    );
    body.push_str(&format!("<cas:user>{}</cas:user>", escape(username)));

    if !attributes.is_empty() {
        body.push_str("<cas:attributes>");
        for (name, value) in attributes {
            body.push_str(&format!(
                "<cas:{name}>{value}</cas:{name}>",
                name = name,
                value = escape(value)
            ));
        }
        body.push_str("</cas:attributes>");
    }

    if let Some(iou) = pgt_iou {
        body.push_str(&format!(
            "<cas:proxyGrantingTicket>{}</cas:proxyGrantingTicket>",
            escape(iou)
        ));
    }

    if !proxies.is_empty() {
        body.push_str("<cas:proxies>");
        for proxy in proxies {
            body.push_str(&format!("<cas:proxy>{}</cas:proxy>", escape(proxy)));
        }
        body.push_str("</cas:proxies>");
    }

    body.push_str("</cas:authenticationSuccess></cas:serviceResponse>");
    body
}

pub fn validation_failure(code: &str, message: &str) -> String {
    format!(
        "<cas:serviceResponse xmlns:cas=\"http://www.yale.edu/tp/cas\">\
         <cas:authenticationFailure code=\"{}\">{}</cas:authenticationFailure>\
         </cas:serviceResponse>",
        escape(code),
        escape(message)
    )
}

pub fn proxy_success(ticket: &str) -> String {
    format!(
        "<cas:serviceResponse xmlns:cas=\"http://www.yale.edu/tp/cas\">\
         <cas:proxySuccess><cas:proxyTicket>{}</cas:proxyTicket></cas:proxySuccess>\
         </cas:serviceResponse>",
        escape(ticket)
    )
}

pub fn proxy_failure(code: &str, message: &str) -> String {
    format!(
        "<cas:serviceResponse xmlns:cas=\"http://www.yale.edu/tp/cas\">\
         <cas:proxyFailure code=\"{}\">{}</cas:proxyFailure>\
         </cas:serviceResponse>",
        escape(code),
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape("a<b>&\"'c"), "a&lt;b&gt;&amp;&quot;&apos;c");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn success_with_attributes_and_iou() {
        let body = validation_success(
            "alice",
            &[("email".into(), "a@example.com".into())],
            Some("PGTIOU-xyz"),
            &[],
        );
        assert!(body.contains("<cas:user>alice</cas:user>"));
        assert!(body.contains("<cas:email>a@example.com</cas:email>"));
        assert!(body.contains("<cas:proxyGrantingTicket>PGTIOU-xyz</cas:proxyGrantingTicket>"));
        assert!(!body.contains("<cas:proxies>"));
    }

    #[test]
    fn success_without_attributes_omits_the_block() {
        let body = validation_success("bob", &[], None, &["https://mid.example/cb".into()]);
        assert!(!body.contains("<cas:attributes>"));
        assert!(body.contains("<cas:proxy>https://mid.example/cb</cas:proxy>"));
    }

    #[test]
    fn failure_carries_code_and_message() {
        let body = validation_failure("INVALID_TICKET", "Ticket ST-1 not recognized");
        assert!(body.contains("code=\"INVALID_TICKET\""));
        assert!(body.contains("Ticket ST-1 not recognized"));
    }
}
