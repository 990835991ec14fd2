//! Text handling between chat messages and the command core.

use regex::Regex;

/// Telegram's limit for one message, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

const CLIP_NOTICE: &str = "\n… (message clipped)";

/// Split `/name[@bot] args` into a canonical command name and its argument text.
///
/// Telegram only allows `[a-z0-9_]` in menu commands, so `/jenkins_trigger` is accepted as an
/// alias of `jenkins-trigger`. Returns `None` for plain text and for commands addressed to
/// another bot.
pub fn parse_command(text: &str, bot_username: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^/([A-Za-z0-9_-]+)(?:@([A-Za-z0-9_]+))?(?:\s+([\s\S]*))?$").ok()?;
    let caps = re.captures(text.trim())?;

    if let Some(target) = caps.get(2) {
        if !target.as_str().eq_ignore_ascii_case(bot_username) {
            return None;
        }
    }

    let name = caps.get(1)?.as_str().to_ascii_lowercase().replace('_', "-");
    let args = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    Some((name, args))
}

/// Whether a plain message is addressed to the bot.
pub fn mentions(text: &str, bot_username: &str) -> bool {
    let handle = format!("@{}", bot_username.to_ascii_lowercase());
    text.to_ascii_lowercase().contains(&handle)
}

/// Shorten a reply so it fits one Telegram message.
pub fn clip(text: &str) -> String {
    let units: usize = text.encode_utf16().count();
    if units <= MAX_MESSAGE_LEN {
        return text.to_string();
    }
    let budget = MAX_MESSAGE_LEN - CLIP_NOTICE.encode_utf16().count();
    let mut used = 0;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        if used + ch.len_utf16() > budget {
            break;
        }
        used += ch.len_utf16();
        end = idx + ch.len_utf8();
    }
    format!("{}{}", &text[..end], CLIP_NOTICE)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn render_inline(text: &str, out: &mut String) {
    let parts: Vec<&str> = text.split('`').collect();
    let closed = parts.len() % 2 == 1;
    for (i, part) in parts.iter().enumerate() {
        let last = i == parts.len() - 1;
        if i % 2 == 0 {
            out.push_str(&escape(part));
        } else if last && !closed {
            out.push('`');
            out.push_str(&escape(part));
        } else {
            out.push_str("<code>");
            out.push_str(&escape(part));
            out.push_str("</code>");
        }
    }
}

/// Render the reply markup (```` ``` ```` blocks and `` `code` `` spans) as Telegram HTML.
///
/// An unterminated block runs to the end of the text, which is what a clipped reply produces.
pub fn render_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    for (i, segment) in text.split("```").enumerate() {
        if i % 2 == 0 {
            render_inline(segment, &mut out);
        } else {
            let body = segment.strip_prefix('\n').unwrap_or(segment);
            let body = body.strip_suffix('\n').unwrap_or(body);
            out.push_str("<pre>");
            out.push_str(&escape(body));
            out.push_str("</pre>");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(
            parse_command("/jenkins-trigger deploy-app env=prod", "opsbot"),
            Some(("jenkins-trigger".to_string(), "deploy-app env=prod".to_string()))
        );
        assert_eq!(
            parse_command("/jenkins_trigger@OpsBot build-app", "opsbot"),
            Some(("jenkins-trigger".to_string(), "build-app".to_string()))
        );
        assert_eq!(
            parse_command("/docker-ps", "opsbot"),
            Some(("docker-ps".to_string(), String::new()))
        );
        assert_eq!(parse_command("/help@otherbot", "opsbot"), None);
        assert_eq!(parse_command("hello there", "opsbot"), None);
    }

    #[test]
    fn test_multiline_arguments_are_kept() {
        let (_, args) = parse_command("/metrics-query sum by (pod)\n(rate(x[5m]))", "opsbot").unwrap();
        assert_eq!(args, "sum by (pod)\n(rate(x[5m]))");
    }

    #[test]
    fn test_mentions() {
        assert!(mentions("hey @OpsBot are you there", "opsbot"));
        assert!(!mentions("hey everyone", "opsbot"));
    }

    #[test]
    fn test_render_blocks_and_code() {
        let html = render_html("Pods in `default`:\n```\nNAME  AGE\n<web> 2d\n```");
        assert_eq!(html, "Pods in <code>default</code>:\n<pre>NAME  AGE\n&lt;web&gt; 2d</pre>");
    }

    #[test]
    fn test_render_unterminated() {
        assert_eq!(render_html("a ` b"), "a ` b");
        assert_eq!(render_html("x\n```\nlog & more"), "x\n<pre>log &amp; more</pre>");
    }

    #[test]
    fn test_clip() {
        let short = "ok";
        assert_eq!(clip(short), short);

        let long = "é".repeat(5000);
        let clipped = clip(&long);
        assert!(clipped.encode_utf16().count() <= MAX_MESSAGE_LEN);
        assert!(clipped.ends_with("(message clipped)"));
    }
}
