use url::Url;

use crate::BridgeError;

/// Parameters the external viewer is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewerParams {
    pub source: String,
    pub page: u32,
    pub title: Option<String>,
    pub highlight: Vec<String>,
    pub search: Option<String>,
}

impl ViewerParams {
    pub fn new(source: impl Into<String>, page: u32) -> Self {
        Self {
            source: source.into(),
            page: page.max(1),
            ..Self::default()
        }
    }

    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("file", &self.source);
            query.append_pair("page", &self.page.max(1).to_string());
            if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
                query.append_pair("title", title);
            }
            for term in self.highlight.iter().filter(|t| !t.is_empty()) {
                query.append_pair("highlight", term);
            }
            if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
                query.append_pair("search", search);
            }
        }
        url
    }

    pub fn from_url(url: &Url) -> Result<Self, BridgeError> {
        let mut params = ViewerParams::default();
        let mut has_source = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "file" => {
                    params.source = value.into_owned();
                    has_source = true;
                }
                "page" => params.page = value.parse().unwrap_or(1),
                "title" => params.title = Some(value.into_owned()),
                "highlight" => params.highlight.push(value.into_owned()),
                "search" => params.search = Some(value.into_owned()),
                _ => {}
            }
        }
        if !has_source || params.source.is_empty() {
            return Err(BridgeError::MissingSource);
        }
        params.page = params.page.max(1);
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_url_encoded() {
        let base = Url::parse("http://localhost:8080/viewer.html").unwrap();
        let params = ViewerParams {
            source: "reports/Q3 & Q4.pdf".into(),
            page: 12,
            title: Some("Quarterly report".into()),
            highlight: vec!["net".into(), "income".into()],
            search: Some("net income".into()),
        };
        let url = params.to_url(&base);
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/viewer.html?file=reports%2FQ3+%26+Q4.pdf&page=12\
             &title=Quarterly+report&highlight=net&highlight=income&search=net+income"
        );
        assert_eq!(ViewerParams::from_url(&url).unwrap(), params);
    }

    #[test]
    fn page_zero_opens_first_page() {
        let base = Url::parse("http://localhost/viewer.html?stale=1").unwrap();
        let url = ViewerParams::new("a.pdf", 0).to_url(&base);
        assert_eq!(url.query(), Some("file=a.pdf&page=1"));
    }

    #[test]
    fn url_without_source_is_rejected() {
        let url = Url::parse("http://localhost/viewer.html?page=3").unwrap();
        assert!(matches!(
            ViewerParams::from_url(&url),
            Err(BridgeError::MissingSource)
        ));
    }
}
