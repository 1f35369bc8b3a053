use std::path::Path;

use crate::lexer::{tokenize, Token, TokenKind};
use crate::{
    ClassDecl, ClassKey, IncludeDirective, ParseError, SourceSpan, SourceVisitor,
    StructuralParser, SymbolTable,
};

/// Brace-structure parser: recognizes declarations by their leading keyword and skips
/// everything else up to the next `;` or block.
///
/// Conditional compilation is not evaluated; both branches of an `#if` are walked.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineParser;

impl OutlineParser {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralParser for OutlineParser {
    fn parse(
        &self,
        path: &Path,
        text: &str,
        symbols: &SymbolTable,
        visitor: &mut dyn SourceVisitor,
    ) -> Result<(), ParseError> {
        let tokens = expand_macros(tokenize(text)?, symbols);
        Walker {
            path,
            symbols,
            tokens,
            pos: 0,
            frames: Vec::new(),
            visitor,
        }
        .run()
    }
}

fn expand_macros(tokens: Vec<Token>, symbols: &SymbolTable) -> Vec<Token> {
    if symbols.macros.is_empty() {
        return tokens;
    }
    tokens
        .into_iter()
        .filter_map(|mut token| {
            let replacement = token.ident().and_then(|name| symbols.macros.get(name));
            match replacement.map(|r| r.trim()) {
                None => Some(token),
                Some("") => None,
                Some(r) if is_identifier(r) => {
                    token.kind = TokenKind::Ident(r.to_string());
                    Some(token)
                }
                Some(_) => Some(token),
            }
        })
        .collect()
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    /// `namespace a::b {` opens several namespaces with one brace.
    Namespace { depth: usize },
    Class { reported: bool, typedef_tail: bool },
    Function,
    Block,
}

struct Walker<'a, 'v> {
    path: &'a Path,
    symbols: &'a SymbolTable,
    tokens: Vec<Token>,
    pos: usize,
    frames: Vec<Frame>,
    visitor: &'v mut dyn SourceVisitor,
}

impl Walker<'_, '_> {
    fn nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn cur(&self) -> &Token {
        self.nth(0)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.cur().kind == kind
    }

    fn bump(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn span(&self) -> SourceSpan {
        let token = self.cur();
        SourceSpan::new(token.position, token.len)
    }

    fn in_function(&self) -> bool {
        self.frames.iter().any(|frame| matches!(frame, Frame::Function))
    }

    fn run(mut self) -> Result<(), ParseError> {
        loop {
            if self.visitor.should_stop() {
                return Ok(());
            }
            let token = self.cur().clone();
            match &token.kind {
                TokenKind::Eof if self.frames.is_empty() => return Ok(()),
                TokenKind::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        open: self.frames.len(),
                    })
                }
                TokenKind::Include { target, angled } => {
                    self.bump();
                    self.report_include(target, *angled, &token);
                }
                TokenKind::Semi => self.bump(),
                TokenKind::LBrace => {
                    self.bump();
                    self.frames.push(Frame::Block);
                }
                TokenKind::RBrace => {
                    self.bump();
                    self.close_scope(token.position)?;
                }
                TokenKind::Ident(word) => self.declaration(word),
                _ => self.skip_statement(),
            }
        }
    }

    fn declaration(&mut self, word: &str) {
        match word {
            "namespace" => self.namespace(),
            "inline" if self.nth(1).is_ident("namespace") => {
                self.bump();
                self.namespace();
            }
            "class" | "struct" | "union" => {
                if !self.class_definition(false) {
                    self.skip_statement();
                }
            }
            "enum" => {
                if !self.enum_definition(false) {
                    self.skip_statement();
                }
            }
            "typedef" => {
                self.bump();
                self.typedef();
            }
            "using" => self.using(),
            "template" => {
                self.bump();
                if self.at(&TokenKind::Lt) {
                    self.skip_angles();
                }
            }
            "extern"
                if self.nth(1).kind == TokenKind::Literal
                    && self.nth(2).kind == TokenKind::LBrace =>
            {
                self.bump();
                self.bump();
                self.bump();
                self.frames.push(Frame::Block);
            }
            "public" | "private" | "protected" if self.nth(1).kind == TokenKind::Colon => {
                self.bump();
                self.bump();
            }
            _ => self.skip_statement(),
        }
    }

    fn close_scope(&mut self, position: usize) -> Result<(), ParseError> {
        match self.frames.pop() {
            None => return Err(ParseError::UnbalancedBraces { position }),
            Some(Frame::Namespace { depth }) => {
                for _ in 0..depth {
                    self.visitor.exit_namespace();
                }
            }
            Some(Frame::Class {
                reported,
                typedef_tail,
            }) => {
                if reported {
                    self.visitor.exit_class();
                }
                if typedef_tail {
                    self.typedef_names();
                }
            }
            Some(Frame::Function) => self.visitor.exit_function_body(),
            Some(Frame::Block) => {}
        }
        Ok(())
    }

    fn report_include(&mut self, target: &str, angled: bool, token: &Token) {
        let include = IncludeDirective {
            target: target.to_string(),
            angled,
            resolved: self.symbols.resolve_include(self.path, target, angled),
            span: SourceSpan::new(token.position, token.len),
        };
        self.visitor.enter_inclusion(&include);
        self.visitor.exit_inclusion();
    }

    /// Skips a balanced `open ... close` group starting at the current token.
    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) {
        let mut depth = 0usize;
        loop {
            let kind = &self.cur().kind;
            if *kind == TokenKind::Eof {
                return;
            }
            if *kind == open {
                depth += 1;
            } else if *kind == close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    self.bump();
                    return;
                }
            }
            self.bump();
        }
    }

    /// Skips `< ... >`, giving up at tokens that cannot appear inside template arguments.
    fn skip_angles(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.cur().kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.bump();
                        return;
                    }
                }
                TokenKind::LParen => {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                    continue;
                }
                TokenKind::Semi | TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof => return,
                _ => {}
            }
            self.bump();
        }
    }

    fn skip_attributes(&mut self) {
        while self.at(&TokenKind::LBracket) && self.nth(1).kind == TokenKind::LBracket {
            self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket);
        }
    }

    /// `[::] a :: b <args> :: C <args>`; returns the segments and the span of the last one.
    fn qualified_name(&mut self) -> (Vec<String>, SourceSpan) {
        let mut segments = Vec::new();
        let mut span = self.span();
        if self.at(&TokenKind::ColonColon) {
            self.bump();
        }
        while let Some(ident) = self.cur().ident().map(str::to_string) {
            span = self.span();
            segments.push(ident);
            self.bump();
            if self.at(&TokenKind::Lt) {
                self.skip_angles();
            }
            if self.at(&TokenKind::ColonColon) && self.nth(1).ident().is_some() {
                self.bump();
                continue;
            }
            break;
        }
        (segments, span)
    }

    /// Anything that is not a recognized declaration: runs to the next `;` or opens the
    /// block that ends it.
    fn skip_statement(&mut self) {
        let in_function = self.in_function();
        let mut saw_parens = false;
        let mut ctor_initializer = false;
        let mut prev: Option<TokenKind> = None;
        loop {
            match self.cur().kind {
                TokenKind::Eof | TokenKind::RBrace | TokenKind::Include { .. } => return,
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::LParen => {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                    saw_parens = true;
                    prev = Some(TokenKind::RParen);
                }
                TokenKind::LBracket => {
                    self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket);
                    prev = Some(TokenKind::RBracket);
                }
                TokenKind::Colon if saw_parens && !in_function => {
                    ctor_initializer = true;
                    prev = Some(TokenKind::Colon);
                    self.bump();
                }
                TokenKind::LBrace if in_function => {
                    self.bump();
                    self.frames.push(Frame::Block);
                    return;
                }
                TokenKind::LBrace => {
                    let after_init = matches!(prev, Some(TokenKind::RParen | TokenKind::RBrace));
                    let is_body = saw_parens
                        && !matches!(prev, Some(TokenKind::Eq | TokenKind::Comma))
                        && (!ctor_initializer || after_init);
                    if is_body {
                        self.bump();
                        self.visitor.enter_function_body();
                        self.frames.push(Frame::Function);
                        return;
                    }
                    // Brace initializer.
                    self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace);
                    prev = Some(TokenKind::RBrace);
                }
                ref kind => {
                    prev = Some(kind.clone());
                    self.bump();
                }
            }
        }
    }

    fn namespace(&mut self) {
        self.bump();
        let mut names = Vec::new();
        loop {
            self.skip_attributes();
            if self.cur().is_ident("inline") {
                self.bump();
            }
            match self.cur().ident().map(str::to_string) {
                Some(name) => {
                    names.push((name, self.span()));
                    self.bump();
                }
                None => break,
            }
            if !self.at(&TokenKind::ColonColon) {
                break;
            }
            self.bump();
        }
        self.skip_attributes();

        if !self.at(&TokenKind::LBrace) {
            // Alias or malformed.
            self.skip_statement();
            return;
        }
        if names.is_empty() {
            names.push((String::new(), self.span()));
        }
        self.bump();
        for (name, span) in &names {
            self.visitor.enter_namespace(name, *span);
        }
        self.frames.push(Frame::Namespace { depth: names.len() });
    }

    /// Returns `false`, with the cursor untouched, unless a class body was opened.
    fn class_definition(&mut self, typedef_tail: bool) -> bool {
        let start = self.pos;
        let key = match self.cur().ident() {
            Some("class") => ClassKey::Class,
            Some("struct") => ClassKey::Struct,
            Some("union") => ClassKey::Union,
            _ => return false,
        };
        self.bump();

        let mut name = None;
        loop {
            match self.cur().kind {
                TokenKind::LBracket if self.nth(1).kind == TokenKind::LBracket => {
                    self.skip_attributes();
                }
                TokenKind::Ident(ref word) if word == "final" || word == "sealed" => self.bump(),
                // alignas(..), __declspec(..), __attribute__((..))
                TokenKind::Ident(_) if self.nth(1).kind == TokenKind::LParen => {
                    self.bump();
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                }
                TokenKind::Ident(_) | TokenKind::ColonColon => {
                    name = Some(self.qualified_name());
                }
                _ => break,
            }
        }

        let bases = match self.cur().kind {
            TokenKind::LBrace => Vec::new(),
            TokenKind::Colon => {
                let bases = self.base_clause();
                if !self.at(&TokenKind::LBrace) {
                    self.pos = start;
                    return false;
                }
                bases
            }
            _ => {
                self.pos = start;
                return false;
            }
        };
        self.bump();

        let reported = match name {
            Some((name, span)) if !name.is_empty() => {
                self.visitor.enter_class(&ClassDecl {
                    key,
                    name,
                    span,
                    bases,
                });
                true
            }
            _ => false,
        };
        self.frames.push(Frame::Class {
            reported,
            typedef_tail,
        });
        true
    }

    fn base_clause(&mut self) -> Vec<Vec<String>> {
        self.bump();
        let mut bases = Vec::new();
        loop {
            while matches!(
                self.cur().ident(),
                Some("public" | "protected" | "private" | "virtual" | "typename")
            ) {
                self.bump();
            }
            if self.cur().ident().is_some() || self.at(&TokenKind::ColonColon) {
                let (segments, _) = self.qualified_name();
                if !segments.is_empty() {
                    bases.push(segments);
                }
            }
            loop {
                match self.cur().kind {
                    TokenKind::Comma => {
                        self.bump();
                        break;
                    }
                    TokenKind::LBrace
                    | TokenKind::RBrace
                    | TokenKind::Semi
                    | TokenKind::Eof => return bases,
                    TokenKind::LParen => self.skip_balanced(TokenKind::LParen, TokenKind::RParen),
                    _ => self.bump(),
                }
            }
        }
    }

    fn enum_definition(&mut self, typedef_tail: bool) -> bool {
        let start = self.pos;
        self.bump();
        if matches!(self.cur().ident(), Some("class" | "struct")) {
            self.bump();
        }
        self.skip_attributes();
        let name = if self.cur().ident().is_some() || self.at(&TokenKind::ColonColon) {
            Some(self.qualified_name())
        } else {
            None
        };
        if self.at(&TokenKind::Colon) {
            while !matches!(
                self.cur().kind,
                TokenKind::LBrace | TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
            ) {
                self.bump();
            }
        }
        if !self.at(&TokenKind::LBrace) {
            self.pos = start;
            return false;
        }
        if let Some((name, span)) = name {
            self.visitor.declare_enum(&name, span);
        }
        self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace);
        if typedef_tail {
            self.typedef_names();
        }
        true
    }

    fn typedef(&mut self) {
        let defined = match self.cur().ident() {
            Some("class" | "struct" | "union") => self.class_definition(true),
            Some("enum") => self.enum_definition(true),
            _ => false,
        };
        if !defined {
            self.typedef_names();
        }
    }

    /// Declarator list of a typedef, up to and including the `;`.
    fn typedef_names(&mut self) {
        let mut candidate: Option<(String, SourceSpan)> = None;
        // Set once a `(*Name)` declarator has fixed the name.
        let mut locked = false;
        loop {
            match self.cur().kind {
                TokenKind::Semi => {
                    self.bump();
                    break;
                }
                TokenKind::Eof | TokenKind::LBrace | TokenKind::RBrace => break,
                TokenKind::Comma => {
                    if let Some((name, span)) = candidate.take() {
                        self.visitor.declare_typedef(&name, span);
                    }
                    locked = false;
                    self.bump();
                }
                TokenKind::LParen if !locked => {
                    if let Some(found) = self.pointer_declarator() {
                        candidate = Some(found);
                        locked = true;
                    }
                }
                TokenKind::LParen => self.skip_balanced(TokenKind::LParen, TokenKind::RParen),
                TokenKind::LBracket => {
                    self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket)
                }
                TokenKind::Lt => self.skip_angles(),
                TokenKind::Ident(ref name) => {
                    if !locked {
                        candidate = Some((name.clone(), self.span()));
                    }
                    self.bump();
                }
                _ => self.bump(),
            }
        }
        if let Some((name, span)) = candidate {
            self.visitor.declare_typedef(&name, span);
        }
    }

    /// At `(`: consumes the group and returns the name of a `(* Name)` or
    /// `(Class::* Name)` declarator inside it.
    fn pointer_declarator(&mut self) -> Option<(String, SourceSpan)> {
        let start = self.pos;
        self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
        let end = self.pos;
        self.tokens[start..end]
            .windows(2)
            .find_map(|pair| match (&pair[0].kind, &pair[1].kind) {
                (TokenKind::Star, TokenKind::Ident(name)) => Some((
                    name.clone(),
                    SourceSpan::new(pair[1].position, pair[1].len),
                )),
                _ => None,
            })
    }

    fn using(&mut self) {
        self.bump();
        if self.cur().is_ident("namespace") {
            self.skip_statement();
            return;
        }
        if let Some(name) = self.cur().ident().map(str::to_string) {
            let span = self.span();
            let mut lookahead = 1;
            while self.nth(lookahead).kind == TokenKind::LBracket {
                lookahead += 1;
                while !matches!(
                    self.nth(lookahead).kind,
                    TokenKind::RBracket | TokenKind::Eof
                ) {
                    lookahead += 1;
                }
                lookahead += 1;
                if self.nth(lookahead).kind == TokenKind::RBracket {
                    lookahead += 1;
                }
            }
            if self.nth(lookahead).kind == TokenKind::Eq {
                self.visitor.declare_typedef(&name, span);
            }
        }
        self.skip_statement();
    }
}
