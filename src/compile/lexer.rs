use crate::types::Modifiers;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    // Literals
    IntLiteral(i64),
    LongLiteral(i64),
    FloatLiteral(f64),
    DoubleLiteral(f64),
    StringLiteral(String),
    CharLiteral(u16),

    // Identifiers and keywords
    Ident(String),
    If,
    Else,
    While,
    Do,
    For,
    Return,
    New,
    This,
    Super,
    Throw,
    Throws,
    Break,
    Continue,
    Instanceof,
    Switch,
    Case,
    Default,
    Try,
    Catch,
    Finally,
    Null,
    True,
    False,
    Synchronized,
    Class,
    Modifier(Modifiers),

    // Primitive type keywords
    KwInt,
    KwLong,
    KwFloat,
    KwDouble,
    KwBoolean,
    KwByte,
    KwChar,
    KwShort,
    KwVoid,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LtLt,
    GtGt,
    GtGtGt,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,
    GtGtGtEq,
    PlusPlus,
    MinusMinus,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Question,
    Colon,

    /// Malformed input; the parser reports it with the carried reason.
    Bad(String),

    // End of input
    Eof,
}

impl Token {
    /// True for tokens that can begin an operand, used to tell a cast from a
    /// parenthesized expression.
    pub fn starts_term(&self) -> bool {
        matches!(
            self,
            Token::IntLiteral(_)
                | Token::LongLiteral(_)
                | Token::FloatLiteral(_)
                | Token::DoubleLiteral(_)
                | Token::StringLiteral(_)
                | Token::CharLiteral(_)
                | Token::Ident(_)
                | Token::This
                | Token::Super
                | Token::New
                | Token::Null
                | Token::True
                | Token::False
                | Token::LParen
                | Token::Bang
                | Token::Tilde
        )
    }
}

#[derive(Clone, Debug)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Splits the whole input. Always ends with [`Token::Eof`].
    pub fn tokenize(mut self) -> Vec<SpannedToken> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.chars.len() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    line: self.line,
                    column: self.column,
                });
                break;
            }
            tokens.push(self.next_token());
        }
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(|c| c.is_whitespace()) {
                self.advance();
            }
            if self.peek() == Some('/') && self.peek_ahead(1) == Some('/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }
            if self.peek() == Some('/') && self.peek_ahead(1) == Some('*') {
                self.advance();
                self.advance();
                while self.peek().is_some() {
                    if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> SpannedToken {
        let line = self.line;
        let column = self.column;
        let token = self.scan();
        SpannedToken { token, line, column }
    }

    fn scan(&mut self) -> Token {
        let c = match self.advance() {
            Some(c) => c,
            None => return Token::Eof,
        };
        match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            '?' => Token::Question,
            ':' => Token::Colon,
            '~' => Token::Tilde,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number('.'),
            '.' => Token::Dot,
            '+' if self.eat('+') => Token::PlusPlus,
            '+' if self.eat('=') => Token::PlusEq,
            '+' => Token::Plus,
            '-' if self.eat('-') => Token::MinusMinus,
            '-' if self.eat('=') => Token::MinusEq,
            '-' => Token::Minus,
            '*' if self.eat('=') => Token::StarEq,
            '*' => Token::Star,
            '/' if self.eat('=') => Token::SlashEq,
            '/' => Token::Slash,
            '%' if self.eat('=') => Token::PercentEq,
            '%' => Token::Percent,
            '&' if self.eat('&') => Token::AmpAmp,
            '&' if self.eat('=') => Token::AmpEq,
            '&' => Token::Amp,
            '|' if self.eat('|') => Token::PipePipe,
            '|' if self.eat('=') => Token::PipeEq,
            '|' => Token::Pipe,
            '^' if self.eat('=') => Token::CaretEq,
            '^' => Token::Caret,
            '!' if self.eat('=') => Token::BangEq,
            '!' => Token::Bang,
            '=' if self.eat('=') => Token::EqEq,
            '=' => Token::Eq,
            '<' if self.eat('<') => {
                if self.eat('=') {
                    Token::LtLtEq
                } else {
                    Token::LtLt
                }
            }
            '<' if self.eat('=') => Token::LtEq,
            '<' => Token::Lt,
            '>' if self.eat('>') => {
                if self.eat('>') {
                    if self.eat('=') {
                        Token::GtGtGtEq
                    } else {
                        Token::GtGtGt
                    }
                } else if self.eat('=') {
                    Token::GtGtEq
                } else {
                    Token::GtGt
                }
            }
            '>' if self.eat('=') => Token::GtEq,
            '>' => Token::Gt,
            '"' => self.read_string(),
            '\'' => self.read_char(),
            _ if c.is_ascii_digit() => self.read_number(c),
            _ if c.is_alphabetic() || c == '_' || c == '$' => self.read_ident_or_keyword(c),
            _ => Token::Bad(format!("unexpected character: '{}'", c)),
        }
    }

    /// Reads one escape sequence after the backslash.
    fn read_escape(&mut self) -> Result<u16, String> {
        let c = self.advance().ok_or("unterminated escape sequence")?;
        Ok(match c {
            'n' => '\n' as u16,
            't' => '\t' as u16,
            'r' => '\r' as u16,
            'f' => 0x0c,
            'b' => 0x08,
            '\\' => '\\' as u16,
            '"' => '"' as u16,
            '\'' => '\'' as u16,
            '0'..='7' => {
                // up to three octal digits, at most \377
                let max_digits = if c <= '3' { 3 } else { 2 };
                let mut value = c as u16 - '0' as u16;
                for _ in 1..max_digits {
                    match self.peek() {
                        Some(d @ '0'..='7') => {
                            self.advance();
                            value = value * 8 + (d as u16 - '0' as u16);
                        }
                        _ => break,
                    }
                }
                value
            }
            'u' => {
                while self.eat('u') {}
                let mut value = 0u16;
                for _ in 0..4 {
                    let digit = self
                        .advance()
                        .and_then(|d| d.to_digit(16))
                        .ok_or("invalid unicode escape")?;
                    value = value * 16 + digit as u16;
                }
                value
            }
            _ => return Err(format!("invalid escape sequence: \\{}", c)),
        })
    }

    fn read_string(&mut self) -> Token {
        let mut units: Vec<u16> = Vec::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Token::Bad("unterminated string literal".into()),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.read_escape() {
                        Ok(unit) => units.push(unit),
                        Err(reason) => return Token::Bad(reason),
                    }
                }
                Some(c) => {
                    self.advance();
                    let mut buf = [0u16; 2];
                    units.extend_from_slice(c.encode_utf16(&mut buf));
                }
            }
        }
        Token::StringLiteral(String::from_utf16_lossy(&units))
    }

    fn read_char(&mut self) -> Token {
        let unit = match self.peek() {
            None | Some('\n') | Some('\'') => return Token::Bad("unterminated char literal".into()),
            Some('\\') => {
                self.advance();
                match self.read_escape() {
                    Ok(unit) => unit,
                    Err(reason) => return Token::Bad(reason),
                }
            }
            Some(c) => {
                self.advance();
                let mut buf = [0u16; 2];
                let encoded = c.encode_utf16(&mut buf);
                if encoded.len() != 1 {
                    return Token::Bad("character literal does not fit in a char".into());
                }
                encoded[0]
            }
        };
        if !self.eat('\'') {
            return Token::Bad("expected closing ' in char literal".into());
        }
        Token::CharLiteral(unit)
    }

    fn read_digits(&mut self, num_str: &mut String, radix: u32) {
        while let Some(c) = self.peek() {
            if c == '_' {
                self.advance();
            } else if c.is_digit(radix) {
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// `first` has already been consumed: a digit or a leading `.`.
    fn read_number(&mut self, first: char) -> Token {
        let mut num_str = String::new();
        let mut is_float = false;

        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.read_digits(&mut num_str, 16);
            let is_long = self.eat('L') || self.eat('l');
            return match u64::from_str_radix(&num_str, 16) {
                Ok(v) if is_long => Token::LongLiteral(v as i64),
                // hex int literals cover the full 32-bit pattern
                Ok(v) if v <= u32::MAX as u64 => Token::IntLiteral(v as u32 as i32 as i64),
                _ => Token::Bad("invalid hex literal".into()),
            };
        }

        num_str.push(first);
        if first == '.' {
            is_float = true;
            self.read_digits(&mut num_str, 10);
        } else {
            self.read_digits(&mut num_str, 10);
            // `1.e5`, `1.f` and `1.` are numbers; `1.foo` is left for the parser to reject
            let ident_part = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
            let after = self.peek_ahead(2);
            let member_follows = match self.peek_ahead(1) {
                Some('e' | 'E') => !after.is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-'),
                Some('f' | 'F' | 'd' | 'D') => after.is_some_and(ident_part),
                Some(c) => c.is_alphabetic() || c == '_' || c == '$',
                None => false,
            };
            if self.peek() == Some('.') && !member_follows {
                is_float = true;
                num_str.push('.');
                self.advance();
                self.read_digits(&mut num_str, 10);
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            num_str.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.read_digits(&mut num_str, 10);
        }

        if self.eat('f') || self.eat('F') {
            return match num_str.parse::<f64>() {
                Ok(v) => Token::FloatLiteral(v as f32 as f64),
                Err(_) => Token::Bad("invalid float literal".into()),
            };
        }
        if self.eat('d') || self.eat('D') {
            is_float = true;
        }
        if is_float {
            return match num_str.parse::<f64>() {
                Ok(v) => Token::DoubleLiteral(v),
                Err(_) => Token::Bad("invalid double literal".into()),
            };
        }

        let is_long = self.eat('L') || self.eat('l');
        let octal = num_str.len() > 1 && num_str.starts_with('0');
        let parsed = if octal {
            u64::from_str_radix(&num_str[1..], 8).ok()
        } else {
            num_str.parse::<u64>().ok()
        };
        match parsed {
            Some(v) if is_long && (octal || v <= i64::MAX as u64 + 1) => Token::LongLiteral(v as i64),
            Some(v) if !is_long && octal && v <= u32::MAX as u64 => {
                Token::IntLiteral(v as u32 as i32 as i64)
            }
            // decimal range is checked once the sign is known
            Some(v) if !is_long && !octal && v <= 1 << 31 => Token::IntLiteral(v as i64),
            _ => Token::Bad(format!("integer number too large: {}", num_str)),
        }
    }

    fn read_ident_or_keyword(&mut self, first: char) -> Token {
        let mut ident = String::new();
        ident.push(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if let Some(modifier) = Modifiers::from_keyword(&ident) {
            // `synchronized` is also a statement keyword
            if modifier != Modifiers::SYNCHRONIZED {
                return Token::Modifier(modifier);
            }
        }
        match ident.as_str() {
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "do" => Token::Do,
            "for" => Token::For,
            "return" => Token::Return,
            "new" => Token::New,
            "this" => Token::This,
            "super" => Token::Super,
            "throw" => Token::Throw,
            "throws" => Token::Throws,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "instanceof" => Token::Instanceof,
            "switch" => Token::Switch,
            "case" => Token::Case,
            "default" => Token::Default,
            "try" => Token::Try,
            "catch" => Token::Catch,
            "finally" => Token::Finally,
            "null" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            "synchronized" => Token::Synchronized,
            "class" => Token::Class,
            "int" => Token::KwInt,
            "long" => Token::KwLong,
            "float" => Token::KwFloat,
            "double" => Token::KwDouble,
            "boolean" => Token::KwBoolean,
            "byte" => Token::KwByte,
            "char" => Token::KwChar,
            "short" => Token::KwShort,
            "void" => Token::KwVoid,
            _ => Token::Ident(ident),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<Token> {
        Lexer::new(s)
            .tokenize()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = lex("int x = 42;");
        assert_eq!(
            tokens,
            vec![
                Token::KwInt,
                Token::Ident("x".into()),
                Token::Eq,
                Token::IntLiteral(42),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#""a\nb\t\101B\f""#);
        assert_eq!(
            tokens,
            vec![Token::StringLiteral("a\nb\tAB\u{c}".into()), Token::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_is_bad() {
        let tokens = lex("\"abc\n\"");
        assert!(matches!(tokens[0], Token::Bad(_)));
    }

    #[test]
    fn test_numeric_suffixes() {
        let tokens = lex("3.14f 2.0 1L 7 1e3 5d 0x1F 017 .5 0xFFFFFFFF");
        assert_eq!(
            tokens,
            vec![
                Token::FloatLiteral(3.14f32 as f64),
                Token::DoubleLiteral(2.0),
                Token::LongLiteral(1),
                Token::IntLiteral(7),
                Token::DoubleLiteral(1000.0),
                Token::DoubleLiteral(5.0),
                Token::IntLiteral(31),
                Token::IntLiteral(15),
                Token::DoubleLiteral(0.5),
                Token::IntLiteral(-1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_trailing_point_literals() {
        let tokens = lex("1.e5 1.f 2.d 3. 1.foo");
        assert_eq!(
            tokens,
            vec![
                Token::DoubleLiteral(100000.0),
                Token::FloatLiteral(1.0),
                Token::DoubleLiteral(2.0),
                Token::DoubleLiteral(3.0),
                Token::IntLiteral(1),
                Token::Dot,
                Token::Ident("foo".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_and_modifiers() {
        let tokens = lex("$1 $_ public static héllo");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("$1".into()),
                Token::Ident("$_".into()),
                Token::Modifier(Modifiers::PUBLIC),
                Token::Modifier(Modifiers::STATIC),
                Token::Ident("héllo".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = lex("a++ && b-- || !c >>>= 2");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::PlusPlus,
                Token::AmpAmp,
                Token::Ident("b".into()),
                Token::MinusMinus,
                Token::PipePipe,
                Token::Bang,
                Token::Ident("c".into()),
                Token::GtGtGtEq,
                Token::IntLiteral(2),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_track_lines() {
        let tokens = Lexer::new("a // comment\n+ b /* block\n */ + c").tokenize();
        let kinds: Vec<_> = tokens.iter().map(|t| t.token.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Ident("a".into()),
                Token::Plus,
                Token::Ident("b".into()),
                Token::Plus,
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[3].line, 3);
    }
}
