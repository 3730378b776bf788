//! Discovery of Designated Resolvers: SVCB answers on the special
//! `_dns.resolver.arpa` name, advertising this deployment's encrypted
//! listeners.

use crate::wire;
use aegis_dns_domain::{CoreError, Question, RecordType, RewriteValue};
use hickory_proto::op::{Message, ResponseCode};
use tracing::warn;

pub const DDR_NAME: &str = "_dns.resolver.arpa";

/// TTL on DDR advertisements.
const DDR_TTL: u32 = 300;

pub fn is_ddr_question(question: &Question) -> bool {
    question.qtype == RecordType::SVCB && question.name.as_ref() == DDR_NAME
}

/// Build the DDR answer from configured `alpn:host:port` templates, e.g.
/// `h2:dns.example.net:443` or `doq:dns.example.net:853`. No templates →
/// NODATA, which tells the stub there is nothing to upgrade to.
pub fn ddr_response(request: &Message, templates: &[String]) -> Result<Message, CoreError> {
    let mut response = wire::response_for(request);
    response.set_response_code(ResponseCode::NoError);

    let qname = wire::fqdn(DDR_NAME)?;
    for (i, template) in templates.iter().enumerate() {
        let Some((alpn, host, port)) = parse_template(template) else {
            warn!(template = %template, "Skipping malformed DDR template");
            continue;
        };

        let value = RewriteValue::SvcRecord {
            https: false,
            priority: (i + 1) as u16,
            target: format!("{host}."),
            params: vec![
                ("alpn".to_string(), alpn.to_string()),
                ("port".to_string(), port.to_string()),
            ],
        };
        response.add_answer(wire::rewrite_record(&qname, &value, DDR_TTL)?);
    }

    Ok(response)
}

fn parse_template(template: &str) -> Option<(&str, &str, u16)> {
    let mut parts = template.splitn(3, ':');
    let alpn = parts.next()?;
    let host = parts.next()?;
    let port: u16 = parts.next()?.parse().ok()?;
    if alpn.is_empty() || host.is_empty() {
        return None;
    }
    Some((alpn, host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddr_question_detection() {
        assert!(is_ddr_question(&Question::new(
            "_dns.resolver.arpa",
            RecordType::SVCB
        )));
        assert!(!is_ddr_question(&Question::new(
            "_dns.resolver.arpa",
            RecordType::A
        )));
        assert!(!is_ddr_question(&Question::new(
            "example.com",
            RecordType::SVCB
        )));
    }

    #[test]
    fn templates_become_svcb_records() {
        let question = Question::new(DDR_NAME, RecordType::SVCB);
        let request = wire::build_query(&question, false).unwrap();
        let response = ddr_response(
            &request,
            &[
                "h2:dns.example.net:443".to_string(),
                "doq:dns.example.net:853".to_string(),
                "garbage".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(response.answers().len(), 2);
    }
}
