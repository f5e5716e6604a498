//! Idempotent request mutations: headers, path, and query string.

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri};

use crate::config::schema::TransformConfig;
use crate::policy::{ClientIdentity, Policy, PolicyError, Verdict};

/// Request transform scoped to one rule. Mutations apply in a fixed order:
/// remove, set, add headers, then path rewrite, then query additions.
#[derive(Debug)]
pub struct Transform {
    add_headers: Vec<(HeaderName, HeaderValue)>,
    set_headers: Vec<(HeaderName, HeaderValue)>,
    remove_headers: Vec<HeaderName>,
    rewrite_path: Option<(String, String)>,
    add_query: Vec<(String, String)>,
}

impl Transform {
    pub fn from_config(config: &TransformConfig) -> Result<Self, String> {
        let parse_pairs = |pairs: &std::collections::BTreeMap<String, String>| {
            pairs
                .iter()
                .map(|(name, value)| {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| format!("invalid header name '{name}': {e}"))?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|e| format!("invalid header value for '{name}': {e}"))?;
                    Ok((name, value))
                })
                .collect::<Result<Vec<_>, String>>()
        };

        Ok(Self {
            add_headers: parse_pairs(&config.add_headers)?,
            set_headers: parse_pairs(&config.set_headers)?,
            remove_headers: config
                .remove_headers
                .iter()
                .map(|name| {
                    HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| format!("invalid header name '{name}': {e}"))
                })
                .collect::<Result<Vec<_>, String>>()?,
            rewrite_path: config
                .rewrite_path
                .as_ref()
                .map(|r| (r.from.clone(), r.to.clone())),
            add_query: config
                .add_query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        for name in &self.remove_headers {
            headers.remove(name);
        }
        for (name, value) in &self.set_headers {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.add_headers {
            let present = headers.get_all(name).iter().any(|v| v == value);
            if !present {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    fn rewrite_uri(&self, uri: &Uri) -> Result<Option<Uri>, PolicyError> {
        let mut path = uri.path().to_string();
        if let Some((from, to)) = &self.rewrite_path {
            path = path.replacen(from.as_str(), to.as_str(), 1);
        }

        let mut query = uri.query().unwrap_or_default().to_string();
        for (key, value) in &self.add_query {
            let already_present = url::form_urlencoded::parse(query.as_bytes())
                .any(|(k, v)| k == *key.as_str() && v == *value.as_str());
            if !already_present {
                let mut appended = url::form_urlencoded::Serializer::new(String::new());
                appended.append_pair(key, value);
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&appended.finish());
            }
        }

        let rewritten = if query.is_empty() {
            path.clone()
        } else {
            format!("{path}?{query}")
        };
        if uri.path_and_query().map(PathAndQuery::as_str) == Some(rewritten.as_str()) {
            return Ok(None);
        }

        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(
            rewritten
                .parse()
                .map_err(|e| PolicyError::InvalidRewrite(format!("{rewritten}: {e}")))?,
        );
        let uri =
            Uri::from_parts(parts).map_err(|e| PolicyError::InvalidRewrite(e.to_string()))?;
        Ok(Some(uri))
    }
}

impl Policy for Transform {
    fn kind(&self) -> &'static str {
        "transform"
    }

    fn apply_request(
        &self,
        request: &mut Request<Body>,
        _client: &ClientIdentity,
    ) -> Result<Verdict, PolicyError> {
        self.apply_headers(request.headers_mut());
        if let Some(uri) = self.rewrite_uri(request.uri())? {
            *request.uri_mut() = uri;
        }
        Ok(Verdict::Allow)
    }

    fn apply_response(&self, status: StatusCode, headers: &HeaderMap) {
        tracing::trace!(
            status = status.as_u16(),
            header_count = headers.len(),
            "Response passed transformed route"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RewritePathConfig;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    fn transform(config: TransformConfig) -> Transform {
        Transform::from_config(&config).unwrap()
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn client() -> ClientIdentity {
        let remote: SocketAddr = "127.0.0.1:1".parse().unwrap();
        ClientIdentity::from_request(&HeaderMap::new(), remote)
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_order_is_remove_set_add() {
        let tf = transform(TransformConfig {
            add_headers: map(&[("x-extra", "1")]),
            set_headers: map(&[("x-tier", "gold")]),
            remove_headers: vec!["x-tier".to_string()],
            ..Default::default()
        });

        let mut req = request("/a");
        req.headers_mut().insert("x-tier", "bronze".parse().unwrap());
        tf.apply_request(&mut req, &client()).unwrap();

        // set wins because remove runs first
        assert_eq!(req.headers().get("x-tier").unwrap(), "gold");
        assert_eq!(req.headers().get("x-extra").unwrap(), "1");
    }

    #[test]
    fn rewrites_first_path_occurrence_only() {
        let tf = transform(TransformConfig {
            rewrite_path: Some(RewritePathConfig {
                from: "/v1".into(),
                to: "/v2".into(),
            }),
            ..Default::default()
        });

        let mut req = request("/v1/api/v1/users");
        tf.apply_request(&mut req, &client()).unwrap();
        assert_eq!(req.uri().path(), "/v2/api/v1/users");
    }

    #[test]
    fn appends_query_preserving_existing() {
        let tf = transform(TransformConfig {
            add_query: map(&[("source", "edge")]),
            ..Default::default()
        });

        let mut req = request("/search?q=abc");
        tf.apply_request(&mut req, &client()).unwrap();
        assert_eq!(req.uri().query(), Some("q=abc&source=edge"));
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let tf = transform(TransformConfig {
            add_headers: map(&[("x-edge", "1")]),
            set_headers: map(&[("x-env", "prod")]),
            remove_headers: vec!["cookie".to_string()],
            rewrite_path: Some(RewritePathConfig {
                from: "/old".into(),
                to: "/new".into(),
            }),
            add_query: map(&[("traced", "yes")]),
        });

        let mut req = request("/old/resource?id=7");
        req.headers_mut().insert("cookie", "secret".parse().unwrap());

        tf.apply_request(&mut req, &client()).unwrap();
        let once_uri = req.uri().clone();
        let once_headers = req.headers().clone();

        tf.apply_request(&mut req, &client()).unwrap();
        assert_eq!(req.uri(), &once_uri);
        assert_eq!(req.headers(), &once_headers);
        assert_eq!(req.uri().path(), "/new/resource");
        assert_eq!(req.uri().query(), Some("id=7&traced=yes"));
        assert_eq!(req.headers().get_all("x-edge").iter().count(), 1);
        assert!(req.headers().get("cookie").is_none());
    }
}
