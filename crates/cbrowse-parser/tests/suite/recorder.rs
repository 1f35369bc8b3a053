use std::path::Path;

use cbrowse_parser::{
    ClassDecl, IncludeDirective, OutlineParser, ParseError, SourceSpan, SourceVisitor,
    StructuralParser, SymbolTable,
};

/// Records visitor events as compact strings.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<String>,
    pub spans: Vec<(String, SourceSpan)>,
    pub stop_after: Option<usize>,
}

impl SourceVisitor for Recorder {
    fn enter_namespace(&mut self, name: &str, span: SourceSpan) {
        self.events.push(format!("ns {name}"));
        self.spans.push((name.to_string(), span));
    }

    fn exit_namespace(&mut self) {
        self.events.push("end ns".to_string());
    }

    fn enter_class(&mut self, decl: &ClassDecl) {
        let name = decl.name.join("::");
        let bases: Vec<String> = decl.bases.iter().map(|b| b.join("::")).collect();
        if bases.is_empty() {
            self.events.push(format!("{:?} {name}", decl.key));
        } else {
            self.events
                .push(format!("{:?} {name} : {}", decl.key, bases.join(", ")));
        }
        self.spans.push((name, decl.span));
    }

    fn exit_class(&mut self) {
        self.events.push("end class".to_string());
    }

    fn declare_enum(&mut self, name: &[String], span: SourceSpan) {
        self.events.push(format!("enum {}", name.join("::")));
        self.spans.push((name.join("::"), span));
    }

    fn declare_typedef(&mut self, name: &str, span: SourceSpan) {
        self.events.push(format!("typedef {name}"));
        self.spans.push((name.to_string(), span));
    }

    fn enter_function_body(&mut self) {
        self.events.push("fn".to_string());
    }

    fn exit_function_body(&mut self) {
        self.events.push("end fn".to_string());
    }

    fn enter_inclusion(&mut self, include: &IncludeDirective) {
        let (open, close) = if include.angled { ('<', '>') } else { ('"', '"') };
        self.events
            .push(format!("include {open}{}{close}", include.target));
    }

    fn should_stop(&self) -> bool {
        self.stop_after
            .is_some_and(|limit| self.events.len() >= limit)
    }
}

pub fn parse_with(text: &str, symbols: &SymbolTable) -> Result<Recorder, ParseError> {
    let mut recorder = Recorder::default();
    OutlineParser::new().parse(Path::new("/src/test.cpp"), text, symbols, &mut recorder)?;
    Ok(recorder)
}

pub fn events(text: &str) -> Vec<String> {
    parse_with(text, &SymbolTable::new())
        .expect("parse")
        .events
}
