// Post-login redirect target validation against the operator allow-list.

use url::Url;

/// Check whether `uri` may be used as a post-login redirect target.
///
/// Fails closed: unparseable URIs, URIs without a host, and an empty
/// allow-list all reject. The lowercased hostname (port stripped) must end
/// with one of the lowercased allowed domains.
///
/// Matching is suffix-only with no label-boundary check, so
/// `evil-example.com` passes against an allowed `example.com`. Kept for
/// compatibility with existing deployments; operators should list fully
/// qualified domains.
pub fn validate_redirect_uri(uri: &str, allowed_domains: &[String]) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };

    if parsed.scheme().is_empty() {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if host.is_empty() {
        return false;
    }

    let host = host.to_lowercase();
    allowed_domains.iter().any(|domain| host.ends_with(&domain.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::validate_redirect_uri;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn accepts_exact_and_subdomain_hosts() {
        let allowed = domains(&["example.com"]);
        assert!(validate_redirect_uri("http://example.com/x", &allowed));
        assert!(validate_redirect_uri("http://sub.example.com/x", &allowed));
        assert!(validate_redirect_uri("https://EXAMPLE.com/callback", &allowed));
    }

    #[test]
    fn rejects_unlisted_hosts() {
        let allowed = domains(&["example.com"]);
        assert!(!validate_redirect_uri("http://evil.com/x", &allowed));
    }

    #[test]
    fn rejects_unparseable_or_incomplete_uris() {
        let allowed = domains(&["example.com"]);
        assert!(!validate_redirect_uri("", &allowed));
        assert!(!validate_redirect_uri("not a url", &allowed));
        assert!(!validate_redirect_uri("/relative/path", &allowed));
    }

    #[test]
    fn rejects_everything_with_empty_allow_list() {
        assert!(!validate_redirect_uri("http://example.com/x", &[]));
    }

    #[test]
    fn port_is_stripped_before_matching() {
        let allowed = domains(&["example.com"]);
        assert!(validate_redirect_uri("http://app.example.com:3000/cb", &allowed));
    }

    #[test]
    fn suffix_match_has_no_label_boundary() {
        // Documented looseness: any host ending in the allowed string passes.
        let allowed = domains(&["example.com"]);
        assert!(validate_redirect_uri("http://evil-example.com/x", &allowed));
    }
}
