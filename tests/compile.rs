use rayc::{compile, error::ErrorClass, source::Source, CompileError};

fn asm(text: &str) -> Vec<String> {
    let source = Source::new("test.ray", text);
    let asm = compile(&source).expect("compilation failed");

    asm.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect()
}

fn class(text: &str) -> ErrorClass {
    let source = Source::new("test.ray", text);
    compile(&source)
        .err()
        .map(|error| error.class())
        .expect("compilation succeeded")
}

fn count(lines: &[String], line: &str) -> usize {
    lines.iter().filter(|candidate| *candidate == line).count()
}

#[test]
fn putchar_then_return() {
    let lines = asm("extern putchar\nfunc main() { putchar(65); return(0) }");
    let listing: Vec<_> = lines.iter().filter(|line| !line.is_empty()).cloned().collect();

    insta::assert_snapshot!(listing.join("\n"), @r"
    format ELF64
    extrn putchar
    section '.text' executable
    ; --- main ---
    public main
    main:
    push rbp
    mov rbp, rsp
    sub rsp, 0x10
    ; 2:15
    mov rdi, 65
    xor eax, eax
    call putchar
    mov [rbp-0x8], rax
    ; 2:28
    mov rax, 0
    mov rsp, rbp
    pop rbp
    ret
    ");
}

#[test]
fn section_layout() {
    let lines = asm(
        "extern puts\n\
         func greet() => puts(\"hey\")\n\
         func main() {\n  greet()\n}",
    );

    let text = lines
        .iter()
        .position(|line| line == "section '.text' executable")
        .unwrap();
    let greet = lines.iter().position(|line| line == "greet:").unwrap();
    let main = lines.iter().position(|line| line == "main:").unwrap();
    let data = lines
        .iter()
        .position(|line| line == "section '.data' writeable")
        .unwrap();

    assert!(lines.iter().position(|line| line == "extrn puts").unwrap() < text);
    assert!(text < greet && greet < main && main < data);
    assert_eq!(lines[main - 1], "public main");
    assert!(lines.contains(&"call greet".to_string()));
    assert!(lines.contains(&"lea rdi, [__data+0]".to_string()));
    assert_eq!(&lines[data + 2..], ["__data:", "db 104, 101, 121, 0"]);
}

#[test]
fn no_data_section_without_strings() {
    let lines = asm("func main() => exit(0)");
    assert!(!lines.iter().any(|line| line.contains(".data")));
}

#[test]
fn nested_definitions_are_flattened() {
    let lines = asm(
        "func main() {\n  extern putchar\n  func inner() => putchar(33)\n  inner()\n}",
    );

    assert_eq!(count(&lines, "extrn putchar"), 1);
    assert_eq!(count(&lines, "public inner"), 1);
    assert_eq!(count(&lines, "call inner"), 1);
}

#[test]
fn duplicate_extern_is_a_definition_error() {
    assert_eq!(
        class("extern putchar\nextern putchar\nfunc main() => exit(0)"),
        ErrorClass::Definition
    );

    assert_eq!(
        class("extern puts, puts\nfunc main() => exit(0)"),
        ErrorClass::Definition
    );
}

#[test]
fn missing_entry_point() {
    let source = Source::new("test.ray", "extern putchar\nfunc start() => putchar(1)");
    let error = compile(&source).unwrap_err();

    assert!(matches!(error, CompileError::Codegen(_)));
    assert_eq!(error.class(), ErrorClass::MissingEntryPoint);
}

#[test]
fn error_classes_by_phase() {
    assert_eq!(class("func main() => exit(0) $"), ErrorClass::Lexical);
    assert_eq!(class("func main() => exit(\"oops)"), ErrorClass::Lexical);
    assert_eq!(class("func main() => exit(0"), ErrorClass::Syntax);
    assert_eq!(class("func main() => launch(1)"), ErrorClass::Definition);
    assert_eq!(class("func main() => exit(code)"), ErrorClass::Name);
    assert_eq!(
        class("func main() {\n  var a\n  var a\n}"),
        ErrorClass::VariableDefinition
    );
}

#[test]
fn many_parameters_use_caller_stack() {
    let lines = asm(
        "func sum(a, b, c, d, e, f, g) => return(g)\n\
         func main() {\n  var x = sum(1, 2, 3, 4, 5, 6, 7)\n}",
    );

    assert!(lines.contains(&"mov rax, [rbp+0x10]".to_string()));

    let call = lines.iter().position(|line| line == "call sum").unwrap();
    assert_eq!(lines[call + 1], "add rsp, 0x10");

    let sub = lines.iter().position(|line| line == "sub rsp, 0x8").unwrap();
    assert!(sub < call);
    assert_eq!(lines[sub + 1], "mov rax, 7");
    assert_eq!(lines[sub + 2], "push rax");
}

#[test]
fn frame_sizes() {
    let lines = asm("func main(a) {\n  var b = a\n  var c = b\n}");
    assert!(lines.contains(&"sub rsp, 0x20".to_string()));

    let lines = asm("func main(a) {\n  var b = a\n}");
    assert!(lines.contains(&"sub rsp, 0x10".to_string()));
}

#[test]
fn empty_return_loads_nothing() {
    let lines = asm("func main() {\n  return()\n}");
    let main = lines.iter().position(|line| line == "main:").unwrap();

    let body: Vec<_> = lines[main + 1..]
        .iter()
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
        .map(String::as_str)
        .collect();

    insta::assert_snapshot!(body.join("\n"), @r"
    push rbp
    mov rbp, rsp
    mov rsp, rbp
    pop rbp
    ret
    ");
}

#[test]
fn return_in_the_middle_keeps_implicit_epilogue() {
    let lines = asm("func main() {\n  return(1)\n  exit(2)\n}");

    assert_eq!(count(&lines, "ret"), 2);
    assert_eq!(count(&lines, "xor eax, eax"), 1);
}

#[test]
fn local_shadowing_an_extern() {
    // La llamada va al símbolo importado; el operando lee la local
    let lines = asm("extern f\nfunc main() {\n  var f = 1\n  f(1)\n  exit(f)\n}");

    assert_eq!(count(&lines, "call f"), 1);
    assert_eq!(count(&lines, "mov rdi, [rbp-0x8]"), 1);
}

fn diagnostics(text: &str) -> Vec<String> {
    let source = Source::new("test.ray", text);
    let error = compile(&source).unwrap_err();

    error
        .into_diagnostics(&source)
        .to_string()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn duplicate_extern_points_at_declaration() {
    let lines = diagnostics("extern putchar\nextern putchar\nfunc main() => exit(0)");

    assert_eq!(lines[0], "Definition error: Extern `putchar` was already declared");
    assert_eq!(lines[1], " --> test.ray:2:1");
    assert_eq!(lines[3], "2 | extern putchar");
    assert_eq!(lines[4], "  | ^");
    assert_eq!(lines.last().map(String::as_str), Some("Build failed with 1 error"));
}

#[test]
fn missing_entry_point_points_at_end_of_file() {
    let lines = diagnostics("extern putchar\nfunc start() => putchar(1)");

    assert_eq!(
        lines[0],
        "Missing entry point: Entry point not found, define a function named `main`"
    );
    assert_eq!(lines[1], " --> test.ray:2:27");
}
