use anyhow::{anyhow, Result};
use sleet::{compile, VirtualMachine};
use std::thread;
use std::time::{Duration, Instant};

const SIMPLE_RECURSION: &str = r#"
count = fn(x) {
    if x == 0 { return 0 }
    1 + count(x - 1)
}
count(100)
"#;

const FIBONACCI: &str = r#"
fibonacci = fn(x) {
    if x == 0 { return 0 }
    if x == 1 { return 1 }
    fibonacci(x - 1) + fibonacci(x - 2)
}
fibonacci(25)
"#;

const ARITHMETIC: &str = r#"
compute = fn(n) { a = 1; b = 2; c = 3; d = 4; e = 5; (a + b) * (c + d) - e + n % 7 }
compute(1) + compute(2) + compute(3) + compute(4) + compute(5) + compute(6) + compute(7) + compute(8) + compute(9) + compute(10)
"#;

const CLOSURES: &str = "newAdder = fn(a, b) { fn(c) { a + b + c } }; adder = newAdder(1, 2); adder(8) + adder(9) + adder(10)";

const LIST_BUILTINS: &str = r#"
numbers = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]
getThree = fn(a) { first(a) + first(rest(a)) + first(rest(rest(a))) }
squares = []
fill = fn(i) { if i > len(numbers) { return squares }; push(squares, i * i); fill(i + 1) }
fill(1)
getThree(numbers) + getThree(rest(numbers)) + last(squares)
"#;

const ITERATIONS: u32 = 100;

fn run_vm(input: &str, iterations: u32) -> Option<Duration> {
    let bytecode = match compile(input, "benchmark.sl") {
        Ok(bytecode) => bytecode,
        Err(e) => {
            eprintln!("  Compile error: {}", e);
            return None;
        }
    };

    let mut total_time = Duration::ZERO;
    for _ in 0..iterations {
        let mut vm = VirtualMachine::new("benchmark.sl", bytecode.clone());
        let start = Instant::now();
        if let Err(e) = vm.run() {
            eprintln!("  VM error: {}", e);
            return None;
        }
        total_time += start.elapsed();
    }
    Some(total_time)
}

fn benchmark(name: &str, input: &str, iterations: u32) {
    println!("{}:", name);
    if let Some(vm_time) = run_vm(input, iterations) {
        let per_iteration = vm_time.as_secs_f64() / iterations as f64 * 1000.0;
        println!("  VM: {:.3}ms/iter", per_iteration);
    }
    println!();
}

fn run_benchmarks() {
    println!("=== VM Performance ===");
    println!("({} iterations per benchmark)\n", ITERATIONS);

    benchmark("Simple recursion (100 calls)", SIMPLE_RECURSION, ITERATIONS);
    benchmark("Arithmetic (10 fn calls)", ARITHMETIC, ITERATIONS);
    benchmark("Closures (6 calls)", CLOSURES, ITERATIONS);
    benchmark("List builtins", LIST_BUILTINS, ITERATIONS);
    benchmark("Fibonacci(25)", FIBONACCI, 1);
}

fn main() -> Result<()> {
    let builder = thread::Builder::new().stack_size(32 * 1024 * 1024);
    let handler = builder.spawn(run_benchmarks)?;
    handler
        .join()
        .map_err(|_| anyhow!("benchmark thread panicked"))
}
