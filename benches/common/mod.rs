/// Benchmark workloads: a recursion-heavy program and a dispatch-heavy one.
pub fn workloads() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "fib",
            r#"
fun fib(n) {
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}
print fib(15);
"#,
        ),
        (
            "classes",
            r#"
class Accumulator {
    init() { this.total = 0; }
    add(n) { this.total = this.total + n; return this; }
    value { return this.total; }
}

var acc = Accumulator();
for (var i = 0; i < 500; i = i + 1) {
    acc.add(i % 7);
}
print acc.value;
"#,
        ),
    ]
}
