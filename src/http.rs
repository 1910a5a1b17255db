// passwd is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// passwd is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with passwd.  If not, see <http://www.gnu.org/licenses/>.

use crate::{Dependencies, Driver, PasswdError, PasswdResult};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use urlencoding::encode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Form URL, `::USERNAME::` is replaced by the url-encoded username
    pub url: String,
    pub method: String,
    pub username_field: String,
    pub old_password_field: String,
    pub new_password_field: String,
    pub confirm_password_field: Option<String>,
    /// Constant fields submitted along with the credentials
    pub extra_fields: BTreeMap<String, String>,
    pub success_marker: Option<String>,
    pub error_marker: Option<String>,
    pub bad_password_marker: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::from("https://localhost/password"),
            method: String::from("POST"),
            username_field: String::from("username"),
            old_password_field: String::from("oldpassword"),
            new_password_field: String::from("newpassword"),
            confirm_password_field: None,
            extra_fields: BTreeMap::new(),
            success_marker: None,
            error_marker: None,
            bad_password_marker: None,
        }
    }
}

/// Submits the password change to a web form
#[derive(Debug, Clone)]
pub struct HttpDriver {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl HttpDriver {
    pub fn new(config: HttpConfig, deps: &Dependencies) -> Self {
        Self {
            config,
            agent: deps.agent.clone(),
        }
    }

    fn fields<'a>(
        &'a self,
        username: &'a str,
        old_password: &'a str,
        new_password: &'a str,
    ) -> Vec<(&'a str, &'a str)> {
        let mut fields = vec![
            (self.config.username_field.as_str(), username),
            (self.config.old_password_field.as_str(), old_password),
            (self.config.new_password_field.as_str(), new_password),
        ];
        if let Some(confirm) = &self.config.confirm_password_field {
            fields.push((confirm.as_str(), new_password));
        }
        fields.extend(
            self.config
                .extra_fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        fields
    }

    /// Decides the outcome from the body of a successful response
    fn check_body(&self, body: &str) -> PasswdResult<()> {
        let contains = |marker: &Option<String>| {
            marker
                .as_deref()
                .map(|marker| body.contains(marker))
                .unwrap_or(false)
        };
        if contains(&self.config.bad_password_marker) {
            return Err(PasswdError::BadOldPassword);
        }
        if contains(&self.config.error_marker) {
            return Err(PasswdError::Rejected(String::from(
                "server reported an error",
            )));
        }
        match &self.config.success_marker {
            Some(marker) if !body.contains(marker.as_str()) => Err(PasswdError::Rejected(
                String::from("server response lacks success marker"),
            )),
            _ => Ok(()),
        }
    }
}

impl Driver for HttpDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        let url = self.config.url.replace("::USERNAME::", &encode(username));
        let fields = self.fields(username, old_password, new_password);
        debug!("submit password change to {} {url}", self.config.method);

        let request = self.agent.request(&self.config.method, &url);
        let response = match self.config.method.eq_ignore_ascii_case("GET") {
            true => fields
                .iter()
                .fold(request, |request, (k, v)| request.query(k, v))
                .call(),
            false => request.send_form(&fields),
        };

        match response {
            Ok(res) => {
                let body = res.into_string()?;
                self.check_body(&body)
            }
            Err(ureq::Error::Status(code, res)) => Err(PasswdError::Rejected(format!(
                "unexpected http response: {code} {}",
                res.status_text()
            ))),
            Err(err) => Err(PasswdError::Transport(format!(
                "unable to reach server: {err}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};

    fn driver(path: &str) -> HttpDriver {
        let config = HttpConfig {
            url: format!("{}{path}", mockito::server_url()),
            username_field: String::from("user"),
            old_password_field: String::from("old"),
            new_password_field: String::from("new"),
            confirm_password_field: Some(String::from("confirm")),
            extra_fields: BTreeMap::from([(String::from("submit"), String::from("1"))]),
            success_marker: Some(String::from("Password changed")),
            error_marker: Some(String::from("Error:")),
            bad_password_marker: Some(String::from("Old password incorrect")),
            ..Default::default()
        };
        HttpDriver::new(config, &Dependencies::new())
    }

    #[test]
    fn form_is_submitted_with_all_fields() {
        let m = mock("POST", "/users/al%20ice/password")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".into(), "al ice".into()),
                Matcher::UrlEncoded("old".into(), "oldpw".into()),
                Matcher::UrlEncoded("new".into(), "newpw".into()),
                Matcher::UrlEncoded("confirm".into(), "newpw".into()),
                Matcher::UrlEncoded("submit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body("<p>Password changed</p>")
            .create();
        driver("/users/::USERNAME::/password")
            .change_password("al ice", "oldpw", "newpw")
            .unwrap();
        m.assert();
    }

    #[test]
    fn get_sends_fields_as_query() {
        let m = mock("GET", "/get/password")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".into(), "bob".into()),
                Matcher::UrlEncoded("old".into(), "o&ld".into()),
                Matcher::UrlEncoded("new".into(), "n w".into()),
                Matcher::UrlEncoded("confirm".into(), "n w".into()),
                Matcher::UrlEncoded("submit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body("Password changed")
            .create();
        let mut driver = driver("/get/password");
        driver.config.method = String::from("GET");
        driver.change_password("bob", "o&ld", "n w").unwrap();
        m.assert();
    }

    #[test]
    fn markers_decide_outcome() {
        let _m = mock("POST", "/markers/bad")
            .with_status(200)
            .with_body("Old password incorrect")
            .create();
        let res = driver("/markers/bad").change_password("bob", "x", "y");
        assert!(matches!(res, Err(PasswdError::BadOldPassword)));

        let _m = mock("POST", "/markers/error")
            .with_status(200)
            .with_body("Error: password too short")
            .create();
        let res = driver("/markers/error").change_password("bob", "x", "y");
        assert!(matches!(res, Err(PasswdError::Rejected(_))));

        let _m = mock("POST", "/markers/none")
            .with_status(200)
            .with_body("<html></html>")
            .create();
        let res = driver("/markers/none").change_password("bob", "x", "y");
        assert!(matches!(res, Err(PasswdError::Rejected(_))));
    }

    #[test]
    fn error_status_is_rejected() {
        let _m = mock("POST", "/status").with_status(403).create();
        let res = driver("/status").change_password("bob", "x", "y");
        assert!(matches!(res, Err(PasswdError::Rejected(_))));
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let config = HttpConfig {
            url: String::from("http://127.0.0.1:1/password"),
            ..Default::default()
        };
        let mut driver = HttpDriver::new(config, &Dependencies::new());
        let res = driver.change_password("bob", "x", "y");
        assert!(matches!(res, Err(PasswdError::Transport(_))));
    }
}
