//! HTML document parsing for the SSO handshake and the portal landing page

use crate::error::{Error, Result};
use crate::models::Profile;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Auto-submitting SAML form extracted from an identity-provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlForm {
    /// Value of the form's `action` attribute, possibly relative
    pub action: String,
    /// Every named input of the form, in document order
    pub fields: Vec<(String, String)>,
}

/// Data scraped from the portal landing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalPage {
    pub profile: Profile,
    /// Path component of the logout link
    pub logout_path: String,
}

struct Selectors {
    form: Selector,
    input: Selector,
    unavailable: Selector,
    name: Selector,
    college: Selector,
    major: Selector,
    level: Selector,
    balance: Selector,
    logout: Selector,
}

impl Selectors {
    fn compile() -> Self {
        let parse = |css: &str| Selector::parse(css).unwrap();
        Self {
            form: parse("form"),
            input: parse("input"),
            unavailable: parse("#class_schedule > div > h1 > b > font"),
            name: parse("#my_tritonlink_sidebar > h2"),
            college: parse("#my_tritonlink_sidebar > p:nth-child(3) > a"),
            major: parse("#my_tritonlink_sidebar > p:nth-child(4) > a"),
            level: parse("#my_tritonlink_sidebar > p:nth-child(5) > b"),
            balance: parse("#account_balance > div.cs_box_amount > a > strong"),
            logout: parse("#tdr_login_content > a"),
        }
    }
}

/// Parser for portal and SSO HTML with selectors compiled on first use
#[derive(Default)]
pub(crate) struct DocumentParser {
    selectors: OnceLock<Selectors>,
}

impl std::fmt::Debug for DocumentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentParser").finish_non_exhaustive()
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn selectors(&self) -> &Selectors {
        self.selectors.get_or_init(Selectors::compile)
    }

    /// Extract the single SAML auto-submit form and its named inputs
    pub fn parse_saml_form(&self, html: &str) -> Result<SamlForm> {
        let document = Html::parse_document(html);
        let selectors = self.selectors();

        let mut forms = document.select(&selectors.form);
        let form = forms
            .next()
            .ok_or_else(|| Error::DocumentShape("no form in SSO response".to_string()))?;
        if forms.next().is_some() {
            return Err(Error::DocumentShape(
                "more than one form in SSO response".to_string(),
            ));
        }

        let action = form
            .value()
            .attr("action")
            .filter(|action| !action.trim().is_empty())
            .ok_or_else(|| Error::DocumentShape("SAML form has no action".to_string()))?
            .trim()
            .to_string();

        let fields: Vec<(String, String)> = form
            .select(&selectors.input)
            .filter_map(|input| {
                let element = input.value();
                let name = element.attr("name")?;
                Some((name.to_string(), element.attr("value").unwrap_or_default().to_string()))
            })
            .collect();

        if fields.is_empty() {
            return Err(Error::DocumentShape("SAML form has no input fields".to_string()));
        }

        Ok(SamlForm { action, fields })
    }

    /// Extract the sidebar profile and logout link from the portal landing page
    ///
    /// An unavailability notice on the page wins over normal extraction.
    pub fn parse_portal_page(&self, html: &str) -> Result<PortalPage> {
        let document = Html::parse_document(html);
        let selectors = self.selectors();

        if let Some(notice) = document
            .select(&selectors.unavailable)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
        {
            return Err(Error::UpstreamUnavailable(notice));
        }

        let text_of = |selector: &Selector, field: &str| {
            document
                .select(selector)
                .next()
                .map(element_text)
                .ok_or_else(|| Error::DocumentShape(format!("portal page has no {field}")))
        };

        let profile = Profile {
            name: text_of(&selectors.name, "student name")?,
            college: text_of(&selectors.college, "college")?,
            major: text_of(&selectors.major, "major")?,
            level: text_of(&selectors.level, "level")?,
            balance: text_of(&selectors.balance, "account balance")?,
        };

        let href = document
            .select(&selectors.logout)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
            .ok_or_else(|| Error::DocumentShape("portal page has no logout link".to_string()))?;

        Ok(PortalPage {
            profile,
            logout_path: path_of(href),
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Path component of an absolute or relative link
fn path_of(href: &str) -> String {
    match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn portal_html(unavailable: Option<&str>) -> String {
        let notice = unavailable
            .map(|text| {
                format!(
                    r#"<div id="class_schedule"><div><h1><b><font>{text}</font></b></h1></div></div>"#
                )
            })
            .unwrap_or_default();
        format!(
            r##"<html><body>
            {notice}
            <div id="tdr_login_content"><a href="https://mytritonlink.ucsd.edu/logout.htm?x=1">Log out</a></div>
            <div id="my_tritonlink_sidebar">
                <h2> Jane Doe </h2>
                <p>Student</p>
                <p><a href="#">Sixth</a></p>
                <p><a href="#">Computer Science</a></p>
                <p><b>Undergraduate</b></p>
            </div>
            <div id="account_balance"><div class="cs_box_amount"><a href="#"><strong>$0.00</strong></a></div></div>
            </body></html>"##
        )
    }

    #[test]
    fn test_saml_form_extraction() {
        let html = r#"<html><body onload="document.forms[0].submit()">
            <form action="/Shibboleth.sso/SAML2/POST" method="post">
                <div>
                    <input type="hidden" name="RelayState" value="cookie:1234"/>
                    <input type="hidden" name="SAMLResponse" value="PHNhbWw+"/>
                </div>
                <noscript><div><input type="submit" value="Continue"/></div></noscript>
            </form></body></html>"#;

        let form = DocumentParser::new().parse_saml_form(html).unwrap();
        assert_eq!(form.action, "/Shibboleth.sso/SAML2/POST");
        assert_eq!(
            form.fields,
            vec![
                ("RelayState".to_string(), "cookie:1234".to_string()),
                ("SAMLResponse".to_string(), "PHNhbWw+".to_string()),
            ]
        );
    }

    #[test]
    fn test_saml_form_without_inputs_is_rejected() {
        let html = r#"<html><body><form action="https://sp.example/acs"></form></body></html>"#;
        let result = DocumentParser::new().parse_saml_form(html);
        assert!(matches!(result, Err(Error::DocumentShape(_))));
    }

    #[test]
    fn test_missing_saml_form_is_rejected() {
        let html = r#"<html><body><p>Invalid username or password</p></body></html>"#;
        let result = DocumentParser::new().parse_saml_form(html);
        assert!(matches!(result, Err(Error::DocumentShape(_))));
    }

    #[test]
    fn test_portal_page_extraction() {
        let page = DocumentParser::new()
            .parse_portal_page(&portal_html(None))
            .unwrap();
        assert_eq!(page.profile.name, "Jane Doe");
        assert_eq!(page.profile.college, "Sixth");
        assert_eq!(page.profile.major, "Computer Science");
        assert_eq!(page.profile.level, "Undergraduate");
        assert_eq!(page.profile.balance, "$0.00");
        assert_eq!(page.logout_path, "/logout.htm");
    }

    #[test]
    fn test_unavailable_notice_overrides_extraction() {
        let html = portal_html(Some("  MyTritonLink is down for maintenance "));
        match DocumentParser::new().parse_portal_page(&html) {
            Err(Error::UpstreamUnavailable(message)) => {
                assert_eq!(message, "MyTritonLink is down for maintenance")
            }
            other => panic!("Expected UpstreamUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_portal_page_missing_sidebar() {
        let html =
            r#"<html><body><div id="tdr_login_content"><a href="/logout">x</a></div></body></html>"#;
        let result = DocumentParser::new().parse_portal_page(html);
        assert!(matches!(result, Err(Error::DocumentShape(_))));
    }

    #[test]
    fn test_relative_logout_path() {
        assert_eq!(path_of("/cgi-bin/logout?return=home"), "/cgi-bin/logout");
        assert_eq!(path_of("https://a.example/b/c#frag"), "/b/c");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_saml_fields_extracted_in_order(
            fields in prop::collection::vec(
                ("[A-Za-z][A-Za-z0-9_]{0,12}", "[A-Za-z0-9+/=]{0,40}"),
                1..6,
            ),
        ) {
            let inputs: String = fields
                .iter()
                .map(|(name, value)| {
                    format!(r#"<input type="hidden" name="{name}" value="{value}"/>"#)
                })
                .collect();
            let html = format!(
                r#"<html><body><form action="https://sp.example/acs"><div>{inputs}</div></form></body></html>"#
            );

            let form = DocumentParser::new().parse_saml_form(&html).unwrap();
            prop_assert_eq!(form.action, "https://sp.example/acs");
            prop_assert_eq!(form.fields, fields);
        }
    }
}
