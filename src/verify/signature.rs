//! Grammar check for `Signature` attribute contents (JVMS 4.7.9.1).

use crate::consts::VERIFY_MAX_SIGNATURE_ITERS;

/// One formal type parameter as written in a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTypeParam {
    pub name: String,
    /// Class bound, `None` when the first bound is an interface.
    pub class_bound: Option<String>,
    pub interface_bounds: Vec<String>,
}

/// Formal type parameters of a class or method signature; empty when it declares none.
pub fn parse_type_parameters(s: &str) -> Option<Vec<SignatureTypeParam>> {
    let mut p = Parser::new(s);
    if p.peek() != Some('<') {
        return Some(Vec::new());
    }
    p.params = Some(Vec::new());
    if !p.type_parameters() {
        return None;
    }
    p.params.take()
}

/// `ClassSignature`: optional type parameters, a superclass, then superinterfaces.
pub fn is_valid_class_signature(s: &str) -> bool {
    let mut p = Parser::new(s);
    if p.peek() == Some('<') && !p.type_parameters() {
        return false;
    }
    if !p.class_type_signature() {
        return false;
    }
    while p.more() {
        if !p.step() || !p.class_type_signature() {
            return false;
        }
    }
    true
}

/// `FieldSignature`: a reference type signature.
pub fn is_valid_field_signature(s: &str) -> bool {
    let mut p = Parser::new(s);
    p.reference_type_signature() && p.eof()
}

/// `MethodSignature`: type parameters, parameters, result and throws clauses.
pub fn is_valid_method_signature(s: &str) -> bool {
    let mut p = Parser::new(s);
    if p.peek() == Some('<') && !p.type_parameters() {
        return false;
    }
    if !p.consume('(') {
        return false;
    }
    while p.peek() != Some(')') {
        if !p.step() || !p.java_type_signature() {
            return false;
        }
    }
    p.next();
    if !(p.consume('V') || p.java_type_signature()) {
        return false;
    }
    while p.consume('^') {
        let ok = if p.peek() == Some('T') { p.type_variable_signature() } else { p.class_type_signature() };
        if !ok {
            return false;
        }
    }
    p.eof()
}

struct Parser<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    look: Option<char>,
    pos: usize,
    steps: usize,
    /// Collects type parameters when set.
    params: Option<Vec<SignatureTypeParam>>,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        let mut chars = s.chars();
        let look = chars.next();
        Self { src: s, chars, look, pos: 0, steps: 0, params: None }
    }

    fn peek(&self) -> Option<char> {
        self.look
    }

    fn next(&mut self) -> Option<char> {
        let cur = self.look;
        if let Some(c) = cur {
            self.pos += c.len_utf8();
        }
        self.look = self.chars.next();
        cur
    }

    fn consume(&mut self, c: char) -> bool {
        if self.look == Some(c) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eof(&self) -> bool {
        self.look.is_none()
    }

    fn more(&self) -> bool {
        self.look.is_some()
    }

    /// Caps loop iterations on pathological input.
    fn step(&mut self) -> bool {
        self.steps += 1;
        self.steps <= VERIFY_MAX_SIGNATURE_ITERS
    }

    fn identifier(&mut self) -> bool {
        let mut seen = false;
        while let Some(c) = self.peek() {
            if matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':') {
                break;
            }
            seen = true;
            self.next();
        }
        seen
    }

    fn type_parameters(&mut self) -> bool {
        if !self.consume('<') {
            return false;
        }
        // At least one parameter.
        if self.peek() == Some('>') {
            return false;
        }
        while !self.consume('>') {
            let start = self.pos;
            if !self.step() || !self.identifier() {
                return false;
            }
            let name = self.src[start..self.pos].to_string();
            if !self.consume(':') {
                return false;
            }
            // Class bound may be empty; interface bounds each start with ':'.
            let mut class_bound = None;
            if self.class_bound_follows() {
                let start = self.pos;
                if !self.reference_type_signature() {
                    return false;
                }
                class_bound = Some(self.src[start..self.pos].to_string());
            }
            let mut interface_bounds = Vec::new();
            while self.consume(':') {
                let start = self.pos;
                if !self.step() || !self.reference_type_signature() {
                    return false;
                }
                interface_bounds.push(self.src[start..self.pos].to_string());
            }
            if let Some(params) = self.params.as_mut() {
                params.push(SignatureTypeParam { name, class_bound, interface_bounds });
            }
        }
        true
    }

    fn class_bound_follows(&self) -> bool {
        matches!(self.peek(), Some('L') | Some('T') | Some('['))
    }

    fn java_type_signature(&mut self) -> bool {
        match self.peek() {
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                self.next();
                true
            }
            _ => self.reference_type_signature(),
        }
    }

    fn reference_type_signature(&mut self) -> bool {
        match self.peek() {
            Some('L') => self.class_type_signature(),
            Some('T') => self.type_variable_signature(),
            Some('[') => {
                self.next();
                self.java_type_signature()
            }
            _ => false,
        }
    }

    fn type_variable_signature(&mut self) -> bool {
        self.consume('T') && self.identifier() && self.consume(';')
    }

    /// `L` package/Simple<args>(.Inner<args>)* `;`
    fn class_type_signature(&mut self) -> bool {
        if !self.consume('L') || !self.identifier() {
            return false;
        }
        while self.consume('/') {
            if !self.step() || !self.identifier() {
                return false;
            }
        }
        if self.peek() == Some('<') && !self.type_arguments() {
            return false;
        }
        while self.consume('.') {
            if !self.step() || !self.identifier() {
                return false;
            }
            if self.peek() == Some('<') && !self.type_arguments() {
                return false;
            }
        }
        self.consume(';')
    }

    fn type_arguments(&mut self) -> bool {
        if !self.consume('<') || self.peek() == Some('>') {
            return false;
        }
        while !self.consume('>') {
            if !self.step() {
                return false;
            }
            match self.peek() {
                Some('*') => {
                    self.next();
                }
                Some('+' | '-') => {
                    self.next();
                    if !self.reference_type_signature() {
                        return false;
                    }
                }
                _ => {
                    if !self.reference_type_signature() {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_signatures() {
        assert!(is_valid_class_signature("Ljava/lang/Object;"));
        assert!(is_valid_class_signature("<T:Ljava/lang/Object;>Ljava/lang/Object;Ljava/util/function/Supplier<TT;>;"));
        assert!(is_valid_class_signature("<T::Ljava/lang/Comparable<-TT;>;>Ljava/lang/Object;"));
        assert!(!is_valid_class_signature("<>Ljava/lang/Object;"));
        assert!(!is_valid_class_signature("Ljava/lang/Object"));
    }

    #[test]
    fn field_signatures() {
        assert!(is_valid_field_signature("Ljava/util/List<Ljava/lang/String;>;"));
        assert!(is_valid_field_signature("[TT;"));
        assert!(is_valid_field_signature("Lp/Outer<TT;>.Inner<*>;"));
        assert!(!is_valid_field_signature("I"));
        assert!(!is_valid_field_signature("Ljava/util/List<>;"));
    }

    #[test]
    fn type_parameters_keep_their_bounds() {
        let params = parse_type_parameters("<K:Ljava/lang/Object;V::Ljava/lang/Comparable<TV;>;:Ljava/io/Serializable;>(TK;)TV;").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "K");
        assert_eq!(params[0].class_bound.as_deref(), Some("Ljava/lang/Object;"));
        assert_eq!(params[1].name, "V");
        assert_eq!(params[1].class_bound, None);
        assert_eq!(params[1].interface_bounds, vec!["Ljava/lang/Comparable<TV;>;", "Ljava/io/Serializable;"]);
        assert_eq!(parse_type_parameters("Ljava/lang/Object;"), Some(Vec::new()));
        assert_eq!(parse_type_parameters("<T:>"), Some(vec![SignatureTypeParam {
            name: "T".into(),
            class_bound: None,
            interface_bounds: vec![],
        }]));
    }

    #[test]
    fn method_signatures() {
        assert!(is_valid_method_signature("<T:Ljava/lang/Object;>(Ljava/util/List<+TT;>;I)TT;"));
        assert!(is_valid_method_signature("()V"));
        assert!(is_valid_method_signature("(TE;)V^TX;^Ljava/io/IOException;"));
        assert!(!is_valid_method_signature("(I"));
        assert!(!is_valid_method_signature("()"));
        assert!(!is_valid_method_signature("()VV"));
    }
}
