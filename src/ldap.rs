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

//! LDAP driver, optionally maintaining the Samba password attributes.
//!
//! The old password is verified by binding as the user. Shadow password
//! aging (`shadowLastChange` + `shadowMin`) is honoured before anything is
//! written.

use crate::hashlib::{encrypt_password, msad_password, nt_hash, Encryption, Scheme};
use crate::{
    expand_user, Clock, Dependencies, Driver, PasswdError, PasswdResult, DEFAULT_TIMEOUT,
};

use ldap3::{dn_escape, ldap_escape, LdapConn, LdapConnSettings, Mod, Scope, SearchEntry};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const LDAP_SUCCESS: u32 = 0;
const LDAP_NO_SUCH_OBJECT: u32 = 32;
const LDAP_INVALID_CREDENTIALS: u32 = 49;

impl From<ldap3::LdapError> for PasswdError {
    fn from(error: ldap3::LdapError) -> Self {
        PasswdError::Transport(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    pub host: String,
    pub port: u16,
    /// Use StartTLS on the plain connection
    pub tls: bool,
    pub basedn: String,
    /// Attribute holding the username
    pub uid: String,
    /// DN template for the user, `%u` is the username
    pub userdn: Option<String>,
    /// Additional filter used when searching the user
    pub filter: Option<String>,
    pub binddn: Option<String>,
    pub bindpw: Option<String>,
    /// Attribute holding the password
    pub attribute: String,
    pub encryption: Scheme,
    pub show_encryption: bool,
    pub shadowlastchange: String,
    pub shadowmin: String,
    /// Days until Samba forces the next change, smbldap only
    pub smb_max_age_days: Option<u64>,
    /// Connect and operation timeout in seconds
    pub timeout: u64,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 389,
            tls: false,
            basedn: String::from("ou=people,dc=example,dc=com"),
            uid: String::from("uid"),
            userdn: None,
            filter: None,
            binddn: None,
            bindpw: None,
            attribute: String::from("userPassword"),
            encryption: Scheme::Crypt,
            show_encryption: true,
            shadowlastchange: String::from("shadowLastChange"),
            shadowmin: String::from("shadowMin"),
            smb_max_age_days: None,
            timeout: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl LdapConfig {
    fn url(&self) -> String {
        format!("ldap://{}:{}", self.host, self.port)
    }

    fn admin(&self) -> Option<(&str, &str)> {
        self.binddn
            .as_deref()
            .map(|dn| (dn, self.bindpw.as_deref().unwrap_or_default()))
    }

    /// Returns the DN of the user when it can be derived without a search
    fn derived_user_dn(&self, username: &str) -> Option<String> {
        match &self.userdn {
            Some(template) => Some(expand_user(template, &dn_escape(username))),
            None if self.binddn.is_some() => None,
            None => Some(format!(
                "{}={},{}",
                self.uid,
                dn_escape(username),
                self.basedn
            )),
        }
    }

    fn search_filter(&self, username: &str) -> String {
        let user_filter = format!("({}={})", self.uid, ldap_escape(username));
        match &self.filter {
            Some(filter) => format!("(&{user_filter}{})", parenthesize(filter)),
            None => user_filter,
        }
    }
}

fn parenthesize(filter: &str) -> String {
    match filter.starts_with('(') {
        true => filter.to_string(),
        false => format!("({filter})"),
    }
}

/// Refuses the change while the minimum password age has not passed
///
/// All values are days since the unix epoch resp. days.
pub fn check_shadow_min(
    last_change: Option<u64>,
    min_days: Option<u64>,
    today: u64,
) -> PasswdResult<()> {
    match (last_change, min_days) {
        (Some(last), Some(min)) if last.saturating_add(min) > today => {
            Err(PasswdError::Rejected(format!(
                "minimum password age has not yet expired, next change possible in {} days",
                last.saturating_add(min) - today
            )))
        }
        _ => Ok(()),
    }
}

/// Returns the first value of the attribute, attribute names compare case-insensitively
fn attr_value<'a>(attrs: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn replace<V: Into<Vec<u8>>>(attribute: &str, value: V) -> Mod<Vec<u8>> {
    Mod::Replace(attribute.as_bytes().to_vec(), HashSet::from([value.into()]))
}

/// Directory operations the driver needs, results carry the LDAP result code and text
pub trait Directory {
    fn bind(&mut self, dn: &str, password: &str) -> PasswdResult<(u32, String)>;
    /// Returns the DNs of the entries below `base` matching the filter
    fn search_dns(&mut self, base: &str, filter: &str) -> PasswdResult<Vec<String>>;
    /// Returns the attributes given of a single entry, empty if it is not readable
    fn read(&mut self, dn: &str, attrs: &[&str]) -> PasswdResult<HashMap<String, Vec<String>>>;
    fn modify(&mut self, dn: &str, mods: Vec<Mod<Vec<u8>>>) -> PasswdResult<(u32, String)>;
    fn unbind(&mut self) -> PasswdResult<()>;
}

/// Synchronous ldap3 connection applying the timeout to every operation
pub struct Connection {
    ldap: LdapConn,
    timeout: Duration,
}

impl Directory for Connection {
    fn bind(&mut self, dn: &str, password: &str) -> PasswdResult<(u32, String)> {
        let res = self.ldap.with_timeout(self.timeout).simple_bind(dn, password)?;
        Ok((res.rc, res.text))
    }

    fn search_dns(&mut self, base: &str, filter: &str) -> PasswdResult<Vec<String>> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, vec!["1.1"])?
            .success()?;
        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).dn)
            .collect())
    }

    fn read(&mut self, dn: &str, attrs: &[&str]) -> PasswdResult<HashMap<String, Vec<String>>> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(dn, Scope::Base, "(objectClass=*)", attrs.to_vec())?
            .success()?;
        Ok(entries
            .into_iter()
            .next()
            .map(|entry| SearchEntry::construct(entry).attrs)
            .unwrap_or_default())
    }

    fn modify(&mut self, dn: &str, mods: Vec<Mod<Vec<u8>>>) -> PasswdResult<(u32, String)> {
        let res = self.ldap.with_timeout(self.timeout).modify(dn, mods)?;
        Ok((res.rc, res.text))
    }

    fn unbind(&mut self) -> PasswdResult<()> {
        Ok(self.ldap.unbind()?)
    }
}

/// Changes passwords stored in an LDAP directory
#[derive(Debug, Clone)]
pub struct LdapDriver {
    config: LdapConfig,
    encryption: Encryption,
    samba: bool,
    clock: Clock,
    timeout: Duration,
}

impl LdapDriver {
    pub fn new(config: LdapConfig, deps: &Dependencies) -> Self {
        let encryption = Encryption::new(config.encryption, config.show_encryption);
        let timeout = match config.timeout {
            0 => deps.timeout,
            secs => Duration::from_secs(secs),
        };
        Self {
            config,
            encryption,
            samba: false,
            clock: deps.clock,
            timeout,
        }
    }

    /// Returns a driver which also maintains `sambaNTPassword` and friends
    pub fn smbldap(config: LdapConfig, deps: &Dependencies) -> Self {
        Self {
            samba: true,
            ..Self::new(config, deps)
        }
    }

    fn connect(&self) -> PasswdResult<Connection> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.config.tls);
        let url = self.config.url();
        debug!("connect to {url}");
        let ldap = LdapConn::with_settings(settings, &url)
            .map_err(|err| PasswdError::Transport(format!("unable to connect to {url}: {err}")))?;
        Ok(Connection {
            ldap,
            timeout: self.timeout,
        })
    }

    fn admin_bind(&self, ldap: &mut dyn Directory) -> PasswdResult<bool> {
        let (dn, password) = match self.config.admin() {
            Some(admin) => admin,
            None => return Ok(false),
        };
        debug!("bind as {dn}");
        match ldap.bind(dn, password)? {
            (LDAP_SUCCESS, _) => Ok(true),
            (rc, text) => Err(PasswdError::Transport(format!(
                "unable to bind as {dn}: {text} ({rc})"
            ))),
        }
    }

    fn user_bind(&self, ldap: &mut dyn Directory, dn: &str, password: &str) -> PasswdResult<()> {
        // a simple bind without password is an unauthenticated bind and proves nothing
        if password.is_empty() {
            return Err(PasswdError::BadOldPassword);
        }
        debug!("bind as {dn}");
        match ldap.bind(dn, password)? {
            (LDAP_SUCCESS, _) => Ok(()),
            (LDAP_INVALID_CREDENTIALS, _) => Err(PasswdError::BadOldPassword),
            (LDAP_NO_SUCH_OBJECT, _) => Err(PasswdError::NoUser),
            (rc, text) => Err(PasswdError::Transport(format!(
                "unable to bind as {dn}: {text} ({rc})"
            ))),
        }
    }

    fn find_user_dn(&self, ldap: &mut dyn Directory, username: &str) -> PasswdResult<String> {
        if let Some(dn) = self.config.derived_user_dn(username) {
            return Ok(dn);
        }
        let filter = self.config.search_filter(username);
        debug!("search {filter} below {}", self.config.basedn);
        let dns = ldap.search_dns(&self.config.basedn, &filter)?;
        if dns.len() > 1 {
            warn!("{} entries match {filter}, using the first", dns.len());
        }
        dns.into_iter().next().ok_or(PasswdError::NoUser)
    }

    fn read_entry(
        &self,
        ldap: &mut dyn Directory,
        dn: &str,
    ) -> PasswdResult<HashMap<String, Vec<String>>> {
        ldap.read(
            dn,
            &[
                self.config.shadowlastchange.as_str(),
                self.config.shadowmin.as_str(),
            ],
        )
    }

    fn check_aging(&self, attrs: &HashMap<String, Vec<String>>) -> PasswdResult<()> {
        let number = |name: &str| attr_value(attrs, name).and_then(|v| v.trim().parse::<u64>().ok());
        check_shadow_min(
            number(&self.config.shadowlastchange),
            number(&self.config.shadowmin),
            self.clock.days(),
        )
    }

    /// Modifications replacing the password, plus the aging and Samba attributes
    fn modifications(
        &self,
        attrs: &HashMap<String, Vec<String>>,
        new_password: &str,
    ) -> PasswdResult<Vec<Mod<Vec<u8>>>> {
        let password = match self.encryption.scheme {
            Scheme::Msad => msad_password(new_password),
            _ => encrypt_password(new_password, &self.encryption)?.into_bytes(),
        };
        let mut mods = vec![replace(&self.config.attribute, password)];

        if attr_value(attrs, &self.config.shadowlastchange).is_some() {
            mods.push(replace(
                &self.config.shadowlastchange,
                self.clock.days().to_string(),
            ));
        }

        if self.samba {
            let now = self.clock.now();
            mods.push(replace("sambaNTPassword", nt_hash(new_password)));
            mods.push(replace("sambaPwdLastSet", now.to_string()));
            if let Some(days) = self.config.smb_max_age_days {
                mods.push(replace(
                    "sambaPwdMustChange",
                    now.saturating_add(days.saturating_mul(86400)).to_string(),
                ));
            }
        }
        Ok(mods)
    }

    fn change(
        &self,
        ldap: &mut dyn Directory,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        let admin = self.admin_bind(ldap)?;
        let dn = self.find_user_dn(ldap, username)?;

        // with an admin bind, aging is decided before the old password is even tried
        let mut attrs = None;
        if admin {
            let entry = self.read_entry(ldap, &dn)?;
            self.check_aging(&entry)?;
            attrs = Some(entry);
        }

        self.user_bind(ldap, &dn, old_password)?;

        let attrs = match attrs {
            Some(attrs) => {
                self.admin_bind(ldap)?;
                attrs
            }
            None => {
                let entry = self.read_entry(ldap, &dn)?;
                self.check_aging(&entry)?;
                entry
            }
        };

        let mods = self.modifications(&attrs, new_password)?;
        debug!("modify {dn}");
        match ldap.modify(&dn, mods)? {
            (LDAP_SUCCESS, _) => Ok(()),
            (rc, text) => Err(PasswdError::Rejected(format!("{text} ({rc})"))),
        }
    }
}

impl Driver for LdapDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        let mut ldap = self.connect()?;
        let res = self.change(&mut ldap, username, old_password, new_password);
        if let Err(err) = ldap.unbind() {
            debug!("unable to unbind: {err}");
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashlib::compare_passwords;

    const TODAY: u64 = 19500;

    fn driver(config: LdapConfig, samba: bool) -> LdapDriver {
        let deps = Dependencies::new().clock(Clock::Fixed(TODAY * 86400 + 42));
        match samba {
            true => LdapDriver::smbldap(config, &deps),
            false => LdapDriver::new(config, &deps),
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect()
    }

    fn replaced_bytes(mods: &[Mod<Vec<u8>>]) -> HashMap<String, Vec<u8>> {
        mods.iter()
            .filter_map(|m| match m {
                Mod::Replace(attr, values) => values
                    .iter()
                    .next()
                    .map(|value| (String::from_utf8_lossy(attr).to_string(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn replaced(mods: &[Mod<Vec<u8>>]) -> HashMap<String, String> {
        replaced_bytes(mods)
            .into_iter()
            .map(|(attr, value)| (attr, String::from_utf8_lossy(&value).to_string()))
            .collect()
    }

    const ADMIN: &str = "cn=admin,dc=example,dc=com";
    const JOE: &str = "uid=joe,ou=people,dc=example,dc=com";

    /// In-memory directory answering binds from a password table
    #[derive(Default)]
    struct ScriptedDirectory {
        passwords: HashMap<String, String>,
        entries: HashMap<String, HashMap<String, Vec<String>>>,
        modify_rc: u32,
        calls: Vec<String>,
        modified: Option<Vec<Mod<Vec<u8>>>>,
    }

    impl ScriptedDirectory {
        fn new() -> Self {
            let mut directory = Self::default();
            directory
                .passwords
                .insert(ADMIN.to_string(), String::from("secret"));
            directory
                .passwords
                .insert(JOE.to_string(), String::from("old"));
            directory.entries.insert(JOE.to_string(), HashMap::new());
            directory
        }

        fn aging(mut self, last_change: u64, min: u64) -> Self {
            self.entries.insert(
                JOE.to_string(),
                attrs(&[
                    ("shadowLastChange", last_change.to_string().as_str()),
                    ("shadowMin", min.to_string().as_str()),
                ]),
            );
            self
        }
    }

    impl Directory for ScriptedDirectory {
        fn bind(&mut self, dn: &str, password: &str) -> PasswdResult<(u32, String)> {
            self.calls.push(format!("bind {dn}"));
            Ok(match self.passwords.get(dn) {
                Some(stored) if stored == password => (LDAP_SUCCESS, String::new()),
                Some(_) => (LDAP_INVALID_CREDENTIALS, String::from("invalid credentials")),
                // an empty password would be an anonymous bind
                None if password.is_empty() => (LDAP_SUCCESS, String::new()),
                None => (LDAP_NO_SUCH_OBJECT, String::from("no such object")),
            })
        }

        fn search_dns(&mut self, base: &str, filter: &str) -> PasswdResult<Vec<String>> {
            self.calls.push(format!("search {base} {filter}"));
            Ok(match filter.contains("uid=joe") {
                true => vec![JOE.to_string()],
                false => Vec::new(),
            })
        }

        fn read(
            &mut self,
            dn: &str,
            _attrs: &[&str],
        ) -> PasswdResult<HashMap<String, Vec<String>>> {
            self.calls.push(format!("read {dn}"));
            Ok(self.entries.get(dn).cloned().unwrap_or_default())
        }

        fn modify(&mut self, dn: &str, mods: Vec<Mod<Vec<u8>>>) -> PasswdResult<(u32, String)> {
            self.calls.push(format!("modify {dn}"));
            self.modified = Some(mods);
            Ok((self.modify_rc, String::from("constraint violation")))
        }

        fn unbind(&mut self) -> PasswdResult<()> {
            Ok(())
        }
    }

    fn admin_config() -> LdapConfig {
        LdapConfig {
            binddn: Some(ADMIN.to_string()),
            bindpw: Some(String::from("secret")),
            ..Default::default()
        }
    }

    #[test]
    fn minimum_age_refuses_change() {
        assert!(matches!(
            check_shadow_min(Some(TODAY - 1), Some(7), TODAY),
            Err(PasswdError::Rejected(_))
        ));
        assert!(check_shadow_min(Some(TODAY - 7), Some(7), TODAY).is_ok());
        assert!(check_shadow_min(Some(TODAY), None, TODAY).is_ok());
        assert!(check_shadow_min(None, Some(7), TODAY).is_ok());
    }

    #[test]
    fn aging_reads_attributes_case_insensitively() {
        let driver = driver(LdapConfig::default(), false);
        let entry = attrs(&[("shadowlastchange", "19499"), ("SHADOWMIN", "3")]);
        assert!(matches!(
            driver.check_aging(&entry),
            Err(PasswdError::Rejected(_))
        ));
        let entry = attrs(&[("shadowLastChange", "19490"), ("shadowMin", "3")]);
        assert!(driver.check_aging(&entry).is_ok());
        let entry = attrs(&[("shadowLastChange", "garbage"), ("shadowMin", "3")]);
        assert!(driver.check_aging(&entry).is_ok());
    }

    #[test]
    fn user_dn_derivation() {
        let config = LdapConfig::default();
        assert_eq!(
            config.derived_user_dn("joe").as_deref(),
            Some("uid=joe,ou=people,dc=example,dc=com")
        );
        let escaped = config.derived_user_dn("jo,e").unwrap();
        assert!(escaped.starts_with("uid=jo\\"));
        assert!(escaped.ends_with("e,ou=people,dc=example,dc=com"));

        let config = LdapConfig {
            userdn: Some(String::from("cn=%u,ou=staff,dc=example,dc=com")),
            binddn: Some(String::from("cn=admin,dc=example,dc=com")),
            ..Default::default()
        };
        assert_eq!(
            config.derived_user_dn("joe").as_deref(),
            Some("cn=joe,ou=staff,dc=example,dc=com")
        );

        let config = LdapConfig {
            binddn: Some(String::from("cn=admin,dc=example,dc=com")),
            ..Default::default()
        };
        assert_eq!(config.derived_user_dn("joe"), None);
    }

    #[test]
    fn search_filter_escapes_username() {
        let config = LdapConfig {
            filter: Some(String::from("objectClass=posixAccount")),
            ..Default::default()
        };
        let filter = config.search_filter("j*e");
        assert!(filter.starts_with("(&(uid=j\\"));
        assert!(!filter.contains("j*e"));
        assert!(filter.ends_with("e)(objectClass=posixAccount))"));
    }

    #[test]
    fn modifications_for_plain_ldap() {
        let driver = driver(LdapConfig::default(), false);
        let mods = driver.modifications(&attrs(&[]), "n3wpass").unwrap();
        let values = replaced(&mods);
        assert_eq!(values.len(), 1);
        let encoded = &values["userPassword"];
        assert!(encoded.starts_with("{crypt}"));
        assert!(compare_passwords(encoded, "n3wpass", &driver.encryption).is_ok());

        let mods = driver
            .modifications(&attrs(&[("shadowLastChange", "100")]), "n3wpass")
            .unwrap();
        assert_eq!(replaced(&mods)["shadowLastChange"], TODAY.to_string());
    }

    #[test]
    fn modifications_for_smbldap() {
        let config = LdapConfig {
            smb_max_age_days: Some(90),
            ..Default::default()
        };
        let driver = driver(config, true);
        let values = replaced(&driver.modifications(&attrs(&[]), "password").unwrap());
        assert_eq!(values["sambaNTPassword"], "8846F7EAEE8FB117AD06BDD830B7586C");
        let now = TODAY * 86400 + 42;
        assert_eq!(values["sambaPwdLastSet"], now.to_string());
        assert_eq!(values["sambaPwdMustChange"], (now + 90 * 86400).to_string());
    }

    #[test]
    fn admin_flow_rebinds_before_modify() {
        let driver = driver(admin_config(), false);
        let mut directory = ScriptedDirectory::new().aging(TODAY - 10, 3);
        driver
            .change(&mut directory, "joe", "old", "n3wpass")
            .unwrap();
        assert_eq!(
            directory.calls,
            [
                format!("bind {ADMIN}"),
                String::from("search ou=people,dc=example,dc=com (uid=joe)"),
                format!("read {JOE}"),
                format!("bind {JOE}"),
                format!("bind {ADMIN}"),
                format!("modify {JOE}"),
            ]
        );
        let values = replaced(&directory.modified.unwrap());
        assert!(compare_passwords(&values["userPassword"], "n3wpass", &driver.encryption).is_ok());
        assert_eq!(values["shadowLastChange"], TODAY.to_string());
    }

    #[test]
    fn aging_is_refused_before_the_old_password_is_tried() {
        let driver = driver(admin_config(), false);
        for old in ["old", "wrong"] {
            let mut directory = ScriptedDirectory::new().aging(TODAY - 1, 7);
            assert!(matches!(
                driver.change(&mut directory, "joe", old, "new"),
                Err(PasswdError::Rejected(_))
            ));
            assert!(!directory.calls.contains(&format!("bind {JOE}")));
            assert!(directory.modified.is_none());
        }
    }

    #[test]
    fn bind_result_codes_map_to_errors() {
        let driver_with_admin = driver(admin_config(), false);
        let mut directory = ScriptedDirectory::new();
        assert!(matches!(
            driver_with_admin.change(&mut directory, "joe", "wrong", "new"),
            Err(PasswdError::BadOldPassword)
        ));
        assert!(directory.modified.is_none());

        let mut directory = ScriptedDirectory::new();
        assert!(matches!(
            driver_with_admin.change(&mut directory, "nobody", "old", "new"),
            Err(PasswdError::NoUser)
        ));

        // without admin the DN is derived and the bind itself reports the missing entry
        let plain = driver(LdapConfig::default(), false);
        let mut directory = ScriptedDirectory::new();
        assert!(matches!(
            plain.change(&mut directory, "nobody", "old", "new"),
            Err(PasswdError::NoUser)
        ));
        assert_eq!(
            directory.calls,
            ["bind uid=nobody,ou=people,dc=example,dc=com"]
        );
    }

    #[test]
    fn empty_old_password_never_binds() {
        for config in [LdapConfig::default(), admin_config()] {
            let driver = driver(config, false);
            let mut directory = ScriptedDirectory::new();
            directory.passwords.remove(JOE);
            assert!(matches!(
                driver.change(&mut directory, "joe", "", "new"),
                Err(PasswdError::BadOldPassword)
            ));
            assert!(!directory.calls.contains(&format!("bind {JOE}")));
            assert!(directory.modified.is_none());
        }
    }

    #[test]
    fn user_flow_reads_aging_after_bind() {
        let driver = driver(LdapConfig::default(), false);
        let mut directory = ScriptedDirectory::new().aging(TODAY - 1, 7);
        assert!(matches!(
            driver.change(&mut directory, "joe", "old", "new"),
            Err(PasswdError::Rejected(_))
        ));
        assert_eq!(directory.calls, [format!("bind {JOE}"), format!("read {JOE}")]);

        let mut directory = ScriptedDirectory::new();
        directory.modify_rc = 19;
        match driver.change(&mut directory, "joe", "old", "new") {
            Err(PasswdError::Rejected(msg)) => assert!(msg.contains("(19)")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn msad_writes_raw_unicode_password() {
        let config = LdapConfig {
            attribute: String::from("unicodePwd"),
            encryption: Scheme::Msad,
            ..Default::default()
        };
        let driver = driver(config, false);
        let values = replaced_bytes(&driver.modifications(&attrs(&[]), "pw").unwrap());
        assert_eq!(values["unicodePwd"], msad_password("pw"));
    }

    #[test]
    fn garbage_aging_values_do_not_overflow() {
        assert!(matches!(
            check_shadow_min(Some(u64::MAX), Some(5), TODAY),
            Err(PasswdError::Rejected(_))
        ));
        let config = LdapConfig {
            smb_max_age_days: Some(u64::MAX),
            ..Default::default()
        };
        let values = replaced(&driver(config, true).modifications(&attrs(&[]), "pw").unwrap());
        assert_eq!(values["sambaPwdMustChange"], u64::MAX.to_string());
    }
}
