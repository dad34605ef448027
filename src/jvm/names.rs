use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in internal slash-separated form
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Fully qualified class names in Java source form (dot-separated)
///
/// Unlike `BinaryName`, every segment must be a well-formed Java identifier. This is the
/// form class loaders resolve by, so it is the keying type for substitution tables.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct QualifiedName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for QualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(format!("Qualified name '{}' is empty", name));
        }
        for segment in name.split('.') {
            let mut chars = segment.chars();
            let leading_ok = match chars.next() {
                None => false,
                Some(c) => c.is_alphabetic() || c == '_' || c == '$',
            };
            if !leading_ok || !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                return Err(format!(
                    "Qualified name '{}' has an illegal segment '{}'",
                    name, segment
                ));
            }
        }
        Ok(())
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(QualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    pub const MAIN: Self = Self::name("main");
    pub const PRINTLN: Self = Self::name("println");
    pub const OUT: Self = Self::name("out");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const SYSTEM: Self = Self::name("java/lang/System");
    pub const PRINTSTREAM: Self = Self::name("java/io/PrintStream");

    /// Dot-separated rendering, as a class loader would present the name
    pub fn qualified(&self) -> String {
        self.as_str().replace('/', ".")
    }
}

impl QualifiedName {
    /// Slash-separated rendering, as the class file records the name
    pub fn internal(&self) -> BinaryName {
        BinaryName(Cow::Owned(self.as_str().replace('.', "/")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_qualified_names() {
        for name in ["java.lang.Object", "Standalone", "a.b$inner.C", "_x.y1"] {
            assert_eq!(QualifiedName::check_valid(name), Ok(()), "{}", name);
        }
    }

    #[test]
    fn invalid_qualified_names() {
        for name in ["1.bad.Name", "", "a..b", "a.b-", "trailing.", "sla/sh"] {
            assert!(QualifiedName::check_valid(name).is_err(), "{}", name);
        }
    }

    #[test]
    fn internal_form() {
        let name = QualifiedName::from_string("com.example.Probe".to_string()).unwrap();
        assert_eq!(name.internal().as_str(), "com/example/Probe");
        assert_eq!(BinaryName::OBJECT.qualified(), "java.lang.Object");
    }
}
