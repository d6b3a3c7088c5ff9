use crate::common::*;
use crate::engine::broadcast::BinaryOp;
use crate::engine::filemap::FileProvider;
use crate::engine::subscript::{Modifiers, SubscriptArg};
use crate::runtime::{Session, VecLogger};
use crate::value::{Binding, SymbolTable};

//------------------------------------------------------------------------------
// Session driver
//------------------------------------------------------------------------------

/// Drives one `Session` for one test. Every assertion is prefixed with the
/// test name so a failing case in a table-driven test is easy to spot.
pub(crate) struct Tester {
    test_name: String,
    session: Session,
}

impl Tester {
    pub(crate) fn new<S: ToString>(test_name: S) -> Self {
        Self::new_with_config(test_name, CoreConfig::default())
    }

    pub(crate) fn new_with_config<S: ToString>(test_name: S, config: CoreConfig) -> Self {
        let test_name = test_name.to_string();
        let logger = Box::new(VecLogger::new(test_name.clone()));
        Self { session: Session::new(config, logger), test_name }
    }

    pub(crate) fn with_files(mut self, files: Box<dyn FileProvider>) -> Self {
        self.session = self.session.with_file_provider(files);
        self
    }

    pub(crate) fn symbols(&self) -> &SymbolTable {
        self.session.symbols()
    }

    pub(crate) fn symbols_mut(&mut self) -> &mut SymbolTable {
        self.session.symbols_mut()
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// New free temporary array.
    pub(crate) fn array<T: Element>(&mut self, dims: &[usize], data: &[T]) -> Symbol {
        let name = self.test_name.clone();
        self.symbols_mut()
            .array_from(dims, data)
            .unwrap_or_else(|e| panic!("[{}] building array {:?}: {}", name, dims, e))
    }

    /// New named array, as if assigned to a variable.
    pub(crate) fn named<T: Element>(&mut self, name: &str, dims: &[usize], data: &[T]) -> Symbol {
        let temp = self.array(dims, data);
        let test_name = self.test_name.clone();
        self.symbols_mut()
            .define(name, temp)
            .unwrap_or_else(|e| panic!("[{}] defining {}: {}", test_name, name, e))
    }

    pub(crate) fn scalar<T: Element>(&mut self, v: T) -> Symbol {
        self.symbols_mut().scalar_from(v)
    }

    pub(crate) fn binop<O: BinaryOp>(&mut self, lhs: Symbol, rhs: Symbol, op: O) -> ResultTester {
        let result = self.session.apply_binop(lhs, rhs, &op);
        ResultTester { test_name: &self.test_name, symbols: self.session.symbols(), result }
    }

    pub(crate) fn extract(&mut self, source: Symbol, args: &[SubscriptArg], modifiers: Modifiers) -> ResultTester {
        let result = self.session.extract(source, args, modifiers);
        ResultTester { test_name: &self.test_name, symbols: self.session.symbols(), result }
    }

    /// Looks at an existing symbol without running anything.
    pub(crate) fn value(&self, symbol: Symbol) -> ValueTester {
        ValueTester { test_name: &self.test_name, symbols: self.session.symbols(), symbol }
    }
}

//------------------------------------------------------------------------------
// Outcome of one engine call
//------------------------------------------------------------------------------

pub(crate) struct ResultTester<'a> {
    test_name: &'a str,
    symbols: &'a SymbolTable,
    result: CoreResult<Symbol>,
}

impl<'a> ResultTester<'a> {
    pub(crate) fn expect_ok(self) -> ValueTester<'a> {
        match self.result {
            Ok(symbol) => ValueTester { test_name: self.test_name, symbols: self.symbols, symbol },
            Err(e) => panic!("[{}] Expected success, but it failed with: {}", self.test_name, e),
        }
    }

    pub(crate) fn expect_err(self) -> ErrTester<'a> {
        match self.result {
            Ok(symbol) => panic!(
                "[{}] Expected failure, but it succeeded with {:?} = {:?}",
                self.test_name,
                symbol,
                self.symbols.value(symbol)
            ),
            Err(error) => ErrTester { test_name: self.test_name, error },
        }
    }
}

pub(crate) struct ValueTester<'a> {
    test_name: &'a str,
    symbols: &'a SymbolTable,
    symbol: Symbol,
}

impl<'a> ValueTester<'a> {
    pub(crate) fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub(crate) fn assert_dims(self, dims: &[usize]) -> Self {
        let found = self.symbols.value(self.symbol).ok().and_then(|v| match v {
            Value::Scalar(_) => None,
            other => other.dims(),
        });
        assert_eq!(found.as_deref(), Some(dims), "[{}] Unexpected dims of {:?}", self.test_name, self.symbol);
        self
    }

    pub(crate) fn assert_scalar(self) -> Self {
        let value = self.symbols.value(self.symbol);
        assert!(
            matches!(value, Ok(Value::Scalar(_))),
            "[{}] Expected a scalar, found {:?}",
            self.test_name,
            value
        );
        self
    }

    pub(crate) fn assert_type(self, tag: TypeTag) -> Self {
        let found = self.symbols.type_of(self.symbol);
        assert_eq!(found, Ok(tag), "[{}] Unexpected type of {:?}", self.test_name, self.symbol);
        self
    }

    pub(crate) fn assert_elements<T: Element>(self, expected: &[T]) -> Self {
        let found = self.symbols.elements::<T>(self.symbol);
        assert_eq!(
            found.as_deref(),
            Ok(expected),
            "[{}] Unexpected elements of {:?}",
            self.test_name,
            self.symbol
        );
        self
    }

    pub(crate) fn assert_string(self, expected: &[u8]) -> Self {
        let found = self.symbols.string(self.symbol);
        assert_eq!(found, Ok(expected), "[{}] Unexpected string", self.test_name);
        self
    }

    pub(crate) fn assert_strings(self, expected: &[&[u8]]) -> Self {
        match self.symbols.value(self.symbol) {
            Ok(Value::StrArray(v)) => {
                let found = v.items().iter().map(|s| s.as_slice()).collect::<Vec<_>>();
                assert_eq!(found, expected, "[{}] Unexpected strings", self.test_name);
            },
            other => panic!("[{}] Expected a string array, found {:?}", self.test_name, other),
        }
        self
    }

    pub(crate) fn assert_is(self, other: Symbol) -> Self {
        assert_eq!(self.symbol, other, "[{}] Expected the result to reuse {:?}", self.test_name, other);
        self
    }

    pub(crate) fn assert_is_not(self, other: Symbol) -> Self {
        assert_ne!(self.symbol, other, "[{}] Expected a fresh result, got {:?}", self.test_name, other);
        self
    }

    pub(crate) fn assert_temp(self) -> Self {
        assert_eq!(
            self.symbols.binding(self.symbol),
            Ok(Binding::Temp),
            "[{}] Expected {:?} to be a temporary",
            self.test_name,
            self.symbol
        );
        self
    }
}

pub(crate) struct ErrTester<'a> {
    test_name: &'a str,
    error: CoreError,
}

impl<'a> ErrTester<'a> {
    pub(crate) fn assert_matches<F: Fn(&CoreError) -> bool>(self, what: &str, f: F) -> Self {
        assert!(f(&self.error), "[{}] Expected {}, got: {:?}", self.test_name, what, self.error);
        self
    }

    pub(crate) fn assert_eq(self, expected: CoreError) -> Self {
        assert_eq!(self.error, expected, "[{}] Unexpected error", self.test_name);
        self
    }
}
